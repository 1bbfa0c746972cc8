//! The key-storage provider function table, expressed as a trait.
//!
//! Each method maps onto one entry of the CNG key storage function table.
//! Handles are passed around as raw `ULONG_PTR`-sized values; ownership of
//! them is tracked by [`crate::session::ProviderSession`],
//! [`crate::enumerate::KeyNames`] and [`crate::export::KeyHandle`], never by
//! implementors of this trait.

use crate::status::SecurityStatus;
use cngexport_config::BlobFormat;

/// Opaque provider, key or enumeration-state handle.
pub type RawHandle = usize;

/// `NCRYPT_MACHINE_KEY_FLAG`
pub const MACHINE_KEY_FLAG: u32 = 0x0000_0020;

/// `NCRYPT_PKCS8_PRIVATE_KEY_BLOB`
pub const PKCS8_PRIVATE_KEY_BLOB: &str = "PKCS8_PRIVATEKEY";
/// `LEGACY_RSAPRIVATE_BLOB`
pub const LEGACY_RSAPRIVATE_BLOB: &str = "CAPIPRIVATEBLOB";
/// `BCRYPT_PRIVATE_KEY_BLOB`
pub const BCRYPT_PRIVATE_KEY_BLOB: &str = "PRIVATEBLOB";

/// Blob type identifier passed to `ExportKey` for a configured format.
pub fn blob_type(format: BlobFormat) -> &'static str {
    match format {
        BlobFormat::Pkcs8 => PKCS8_PRIVATE_KEY_BLOB,
        BlobFormat::LegacyRsa => LEGACY_RSAPRIVATE_BLOB,
        BlobFormat::Bcrypt => BCRYPT_PRIVATE_KEY_BLOB,
    }
}

/// One `NCryptKeyName` record, copied out of provider memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyEntry {
    pub name: String,
    pub algorithm: String,
    pub legacy_key_spec: u32,
    pub flags: u32,
}

pub trait KeyStorageProvider {
    fn open_provider(&self, name: &str, flags: u32) -> Result<RawHandle, SecurityStatus>;

    /// Advances the enumeration. `state` starts as `None`; the provider may
    /// store a cursor in it on any call, including failing ones, and the
    /// caller must hand it back to [`Self::free_buffer`] once done.
    fn enum_keys(
        &self,
        provider: RawHandle,
        state: &mut Option<RawHandle>,
        flags: u32,
    ) -> Result<KeyEntry, SecurityStatus>;

    fn open_key(
        &self,
        provider: RawHandle,
        name: &str,
        legacy_key_spec: u32,
        flags: u32,
    ) -> Result<RawHandle, SecurityStatus>;

    /// Exports `key` as `blob_type`. With `output == None` only the required
    /// length is returned. Otherwise the buffer is filled and the number of
    /// bytes written is returned.
    fn export_key(
        &self,
        provider: RawHandle,
        key: RawHandle,
        blob_type: &str,
        output: Option<&mut [u8]>,
        flags: u32,
    ) -> Result<usize, SecurityStatus>;

    fn free_buffer(&self, buffer: RawHandle) -> SecurityStatus;

    fn free_key(&self, provider: RawHandle, key: RawHandle) -> SecurityStatus;

    fn free_provider(&self, provider: RawHandle) -> SecurityStatus;
}
