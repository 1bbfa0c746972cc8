use crate::error::{KspError, Result};
use crate::policy::LayoutPolicyOverride;
use crate::provider::{KeyEntry, KeyStorageProvider, RawHandle};
use crate::runner::Backend;
use crate::status::SecurityStatus;
use cngexport_config::ProviderConfig;

/// Key storage providers only exist on Windows; this type has no values.
pub enum NativeProvider {}

impl KeyStorageProvider for NativeProvider {
    fn open_provider(&self, _: &str, _: u32) -> std::result::Result<RawHandle, SecurityStatus> {
        match *self {}
    }

    fn enum_keys(
        &self,
        _: RawHandle,
        _: &mut Option<RawHandle>,
        _: u32,
    ) -> std::result::Result<KeyEntry, SecurityStatus> {
        match *self {}
    }

    fn open_key(
        &self,
        _: RawHandle,
        _: &str,
        _: u32,
        _: u32,
    ) -> std::result::Result<RawHandle, SecurityStatus> {
        match *self {}
    }

    fn export_key(
        &self,
        _: RawHandle,
        _: RawHandle,
        _: &str,
        _: Option<&mut [u8]>,
        _: u32,
    ) -> std::result::Result<usize, SecurityStatus> {
        match *self {}
    }

    fn free_buffer(&self, _: RawHandle) -> SecurityStatus {
        match *self {}
    }

    fn free_key(&self, _: RawHandle, _: RawHandle) -> SecurityStatus {
        match *self {}
    }

    fn free_provider(&self, _: RawHandle) -> SecurityStatus {
        match *self {}
    }
}

pub fn load(config: &ProviderConfig) -> Result<Backend<NativeProvider, LayoutPolicyOverride>> {
    Err(KspError::Load {
        library: config.library.clone(),
        reason: "key storage providers are only available on Windows".to_string(),
    })
}
