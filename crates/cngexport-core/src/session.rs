use crate::enumerate::KeyNames;
use crate::error::{KspError, Result};
use crate::provider::{KeyStorageProvider, RawHandle, MACHINE_KEY_FLAG};
use crate::status::SecurityStatus;

/// An open provider handle. Freed exactly once, when closed or dropped.
///
/// Keys and enumeration cursors borrow the session, so they are always
/// released before it.
pub struct ProviderSession<'p, P: KeyStorageProvider> {
    provider: &'p P,
    handle: RawHandle,
    name: String,
    open: bool,
}

impl<'p, P: KeyStorageProvider> ProviderSession<'p, P> {
    pub fn open(provider: &'p P, name: &str) -> Result<Self> {
        let handle = provider
            .open_provider(name, 0)
            .map_err(|status| KspError::ProviderOpen {
                provider: name.to_string(),
                status,
            })?;
        tracing::debug!(provider = name, handle, "provider opened");
        Ok(Self {
            provider,
            handle,
            name: name.to_string(),
            open: true,
        })
    }

    pub fn provider(&self) -> &'p P {
        self.provider
    }

    pub fn handle(&self) -> RawHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Machine-scope keys visible to this session.
    pub fn keys(&self) -> KeyNames<'_, 'p, P> {
        KeyNames::new(self, MACHINE_KEY_FLAG)
    }

    /// Frees the provider handle now and returns the provider's status.
    pub fn close(mut self) -> SecurityStatus {
        self.release()
    }

    fn release(&mut self) -> SecurityStatus {
        if !std::mem::replace(&mut self.open, false) {
            return SecurityStatus::SUCCESS;
        }
        let status = self.provider.free_provider(self.handle);
        if status.is_success() {
            tracing::debug!(provider = %self.name, handle = self.handle, "provider freed");
        } else {
            tracing::warn!(provider = %self.name, %status, "free provider failed");
        }
        status
    }
}

impl<P: KeyStorageProvider> Drop for ProviderSession<'_, P> {
    fn drop(&mut self) {
        self.release();
    }
}
