use crate::error::{KspError, Result};
use crate::policy::PolicyOverride;
use crate::provider::{blob_type, KeyStorageProvider, RawHandle, MACHINE_KEY_FLAG};
use crate::session::ProviderSession;
use cngexport_config::BlobFormat;
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::Zeroizing;

/// A key name that can be handed to the provider as a NUL-terminated string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyName(String);

impl KeyName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.contains(['\0', '/', '\\']) {
            return Err(KspError::InvalidKeyName(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An open key. Freed when dropped, always before its session.
pub struct KeyHandle<'s, 'p, P: KeyStorageProvider> {
    session: &'s ProviderSession<'p, P>,
    handle: RawHandle,
    name: KeyName,
}

impl<'s, 'p, P: KeyStorageProvider> KeyHandle<'s, 'p, P> {
    pub fn open(session: &'s ProviderSession<'p, P>, name: &KeyName) -> Result<Self> {
        let handle = session
            .provider()
            .open_key(session.handle(), name.as_str(), 0, MACHINE_KEY_FLAG)
            .map_err(|status| KspError::KeyNotFound {
                name: name.to_string(),
                status,
            })?;
        tracing::debug!(key = %name, handle, "key opened");
        Ok(Self {
            session,
            handle,
            name: name.clone(),
        })
    }

    pub fn raw(&self) -> RawHandle {
        self.handle
    }

    pub fn name(&self) -> &KeyName {
        &self.name
    }
}

impl<P: KeyStorageProvider> Drop for KeyHandle<'_, '_, P> {
    fn drop(&mut self) {
        let status = self
            .session
            .provider()
            .free_key(self.session.handle(), self.handle);
        if status.is_success() {
            tracing::debug!(key = %self.name, "key freed");
        } else {
            tracing::warn!(key = %self.name, %status, "free key failed");
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ExportOptions {
    pub format: BlobFormat,
    pub override_policy: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: BlobFormat::Pkcs8,
            override_policy: true,
        }
    }
}

/// The exported private key material, opaque to this crate.
pub struct KeyBlob {
    pub format: BlobFormat,
    bytes: Zeroizing<Vec<u8>>,
}

impl KeyBlob {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes[..]))
    }
}

impl fmt::Debug for KeyBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyBlob")
            .field("format", &self.format)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug)]
pub struct ExportedKey {
    pub name: KeyName,
    pub blob: KeyBlob,
    pub policy_overridden: bool,
}

pub struct KeyExporter<'o, O: PolicyOverride> {
    policy: &'o O,
    options: ExportOptions,
}

impl<'o, O: PolicyOverride> KeyExporter<'o, O> {
    pub fn new(policy: &'o O, options: ExportOptions) -> Self {
        Self { policy, options }
    }

    /// Opens `name`, forces it exportable if needed and reads its blob.
    /// The key is freed before this returns, whatever the outcome.
    pub fn export<P: KeyStorageProvider>(
        &self,
        session: &ProviderSession<'_, P>,
        name: &KeyName,
    ) -> Result<ExportedKey> {
        let key = KeyHandle::open(session, name)?;
        let policy_overridden = self.ensure_exportable(&key)?;
        let blob = self.read_blob(&key)?;
        drop(key);
        Ok(ExportedKey {
            name: name.clone(),
            blob,
            policy_overridden,
        })
    }

    /// Returns `true` when the policy bit had to be set.
    pub fn ensure_exportable<P: KeyStorageProvider>(
        &self,
        key: &KeyHandle<'_, '_, P>,
    ) -> Result<bool> {
        if self.policy.export_allowed(key.raw()) {
            tracing::debug!(key = %key.name(), "plaintext export already allowed");
            return Ok(false);
        }
        if !self.options.override_policy {
            return Err(KspError::PolicyDenied {
                name: key.name().to_string(),
            });
        }
        tracing::info!(key = %key.name(), "marking key as exportable");
        self.policy.allow_export(key.raw());
        Ok(true)
    }

    /// Size query followed by a fill of exactly that size.
    pub fn read_blob<P: KeyStorageProvider>(&self, key: &KeyHandle<'_, '_, P>) -> Result<KeyBlob> {
        let expected = self.query_size(key)?;
        self.fill(key, expected)
    }

    /// Asks the provider how many bytes the blob needs.
    pub fn query_size<P: KeyStorageProvider>(&self, key: &KeyHandle<'_, '_, P>) -> Result<usize> {
        let blob_type = blob_type(self.options.format);
        let expected = key
            .session
            .provider()
            .export_key(key.session.handle(), key.raw(), blob_type, None, 0)
            .map_err(|status| KspError::Export { status })?;
        tracing::debug!(key = %key.name(), blob_type, len = expected, "export size queried");
        Ok(expected)
    }

    /// Exports into a buffer of exactly `expected` bytes.
    pub fn fill<P: KeyStorageProvider>(
        &self,
        key: &KeyHandle<'_, '_, P>,
        expected: usize,
    ) -> Result<KeyBlob> {
        let blob_type = blob_type(self.options.format);
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(expected)
            .map_err(|_| KspError::Allocation(expected))?;
        buffer.resize(expected, 0u8);
        let mut buffer = Zeroizing::new(buffer);

        let actual = key
            .session
            .provider()
            .export_key(
                key.session.handle(),
                key.raw(),
                blob_type,
                Some(&mut buffer[..]),
                0,
            )
            .map_err(|status| KspError::Export { status })?;
        if actual != expected {
            tracing::error!(key = %key.name(), expected, actual, "export length mismatch");
            return Err(KspError::LengthMismatch { expected, actual });
        }

        let blob = KeyBlob {
            format: self.options.format,
            bytes: buffer,
        };
        tracing::debug!(key = %key.name(), fingerprint = %blob.fingerprint(), "key exported");
        Ok(blob)
    }
}
