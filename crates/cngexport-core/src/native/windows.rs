use super::table::{
    GetKeyStorageInterfaceFn, KeyStorageFunctionTable, NCryptKeyName, SecurityStatusRaw,
};
use super::{FACTORY_SYMBOL, LOCAL_IMPLEMENTATION};
use crate::error::{KspError, Result};
use crate::policy::{LayoutPolicyOverride, SOFTWARE_KSP_LAYOUT};
use crate::provider::{KeyEntry, KeyStorageProvider, RawHandle};
use crate::runner::Backend;
use crate::status::SecurityStatus;
use cngexport_config::ProviderConfig;
use std::ffi::{c_void, CString, OsStr};
use std::os::windows::ffi::OsStrExt;
use std::{mem, ptr, slice};
use winapi::shared::minwindef::HMODULE;
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::libloaderapi::{FreeLibrary, GetProcAddress, LoadLibraryW};

fn wide(s: &str) -> Vec<u16> {
    OsStr::new(s)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

/// Copies a NUL-terminated UTF-16 string out of provider memory.
///
/// # Safety
///
/// `p` must be null or point to a NUL-terminated UTF-16 string.
unsafe fn from_wide_ptr(p: *const u16) -> String {
    if p.is_null() {
        return String::new();
    }
    let mut len = 0;
    while *p.add(len) != 0 {
        len += 1;
    }
    String::from_utf16_lossy(slice::from_raw_parts(p, len))
}

/// A loaded provider module. Unloaded on drop.
pub struct ProviderLibrary {
    module: HMODULE,
    path: String,
}

impl ProviderLibrary {
    pub fn load(path: &str) -> Result<Self> {
        let name = wide(path);
        // SAFETY: `name` is a NUL-terminated wide string that outlives the call.
        let module = unsafe { LoadLibraryW(name.as_ptr()) };
        if module.is_null() {
            // SAFETY: no other API call since LoadLibraryW.
            let code = unsafe { GetLastError() };
            return Err(KspError::Load {
                library: path.to_string(),
                reason: format!("error {code}"),
            });
        }
        tracing::debug!(library = path, "provider library loaded");
        Ok(Self {
            module,
            path: path.to_string(),
        })
    }

    fn factory(&self) -> Result<GetKeyStorageInterfaceFn> {
        let symbol_error = || KspError::Symbol {
            library: self.path.clone(),
            symbol: FACTORY_SYMBOL.to_string(),
        };
        let symbol = CString::new(FACTORY_SYMBOL).map_err(|_| symbol_error())?;
        // SAFETY: `module` is loaded for as long as `self` lives.
        let proc = unsafe { GetProcAddress(self.module, symbol.as_ptr()) };
        if proc.is_null() {
            return Err(symbol_error());
        }
        // SAFETY: `GetKeyStorageInterface` has exactly this signature.
        Ok(unsafe { mem::transmute::<_, GetKeyStorageInterfaceFn>(proc) })
    }
}

impl Drop for ProviderLibrary {
    fn drop(&mut self) {
        // SAFETY: `module` came from LoadLibraryW and is freed only here.
        if unsafe { FreeLibrary(self.module) } == 0 {
            tracing::warn!(library = %self.path, "FreeLibrary failed");
        } else {
            tracing::debug!(library = %self.path, "provider library unloaded");
        }
    }
}

/// The function table of a loaded provider module.
///
/// Field order matters: the table points into the module, so `library` is
/// dropped last.
pub struct NativeProvider {
    table: *const KeyStorageFunctionTable,
    library: ProviderLibrary,
}

impl NativeProvider {
    pub fn open(library: ProviderLibrary) -> Result<Self> {
        let factory = library.factory()?;
        let empty = wide("");
        let mut table: *const KeyStorageFunctionTable = ptr::null();
        // SAFETY: out-pointer is valid; the name is an empty wide string.
        let status =
            SecurityStatus(unsafe { factory(empty.as_ptr(), &mut table, LOCAL_IMPLEMENTATION) });
        status
            .check()
            .map_err(|status| KspError::Interface { status })?;
        if table.is_null() {
            return Err(KspError::Interface {
                status: SecurityStatus::NOT_SUPPORTED,
            });
        }
        tracing::debug!(library = %library.path, "provider interface obtained");
        Ok(Self { table, library })
    }

    pub fn library(&self) -> &ProviderLibrary {
        &self.library
    }

    fn table(&self) -> &KeyStorageFunctionTable {
        // SAFETY: non-null, and valid while `library` stays loaded.
        unsafe { &*self.table }
    }
}

fn missing() -> SecurityStatus {
    SecurityStatus::NOT_SUPPORTED
}

fn status(raw: SecurityStatusRaw) -> std::result::Result<(), SecurityStatus> {
    SecurityStatus(raw).check()
}

impl KeyStorageProvider for NativeProvider {
    fn open_provider(&self, name: &str, flags: u32) -> std::result::Result<RawHandle, SecurityStatus> {
        let f = self.table().open_provider.ok_or_else(missing)?;
        let name = wide(name);
        let mut handle: usize = 0;
        // SAFETY: valid out-pointer and NUL-terminated name.
        status(unsafe { f(&mut handle, name.as_ptr(), flags) })?;
        Ok(handle)
    }

    fn enum_keys(
        &self,
        provider: RawHandle,
        state: &mut Option<RawHandle>,
        flags: u32,
    ) -> std::result::Result<KeyEntry, SecurityStatus> {
        let f = self.table().enum_keys.ok_or_else(missing)?;
        let mut key_name: *mut NCryptKeyName = ptr::null_mut();
        let mut enum_state: *mut c_void = state.map_or(ptr::null_mut(), |s| s as *mut c_void);
        // SAFETY: out-pointers are valid; `enum_state` is null or a cursor this
        // provider handed out earlier.
        let raw = unsafe { f(provider, ptr::null(), &mut key_name, &mut enum_state, flags) };
        *state = (!enum_state.is_null()).then_some(enum_state as RawHandle);
        status(raw)?;
        if key_name.is_null() {
            return Err(SecurityStatus::INVALID_PARAMETER);
        }
        // SAFETY: the provider returned a valid NCryptKeyName.
        let entry = unsafe {
            let record = &*key_name;
            KeyEntry {
                name: from_wide_ptr(record.name),
                algorithm: from_wide_ptr(record.algid),
                legacy_key_spec: record.legacy_key_spec,
                flags: record.flags,
            }
        };
        let released = self.free_buffer(key_name as RawHandle);
        if !released.is_success() {
            tracing::warn!(status = %released, "free key name buffer failed");
        }
        Ok(entry)
    }

    fn open_key(
        &self,
        provider: RawHandle,
        name: &str,
        legacy_key_spec: u32,
        flags: u32,
    ) -> std::result::Result<RawHandle, SecurityStatus> {
        let f = self.table().open_key.ok_or_else(missing)?;
        let name = wide(name);
        let mut key: usize = 0;
        // SAFETY: valid out-pointer and NUL-terminated name.
        status(unsafe { f(provider, &mut key, name.as_ptr(), legacy_key_spec, flags) })?;
        Ok(key)
    }

    fn export_key(
        &self,
        provider: RawHandle,
        key: RawHandle,
        blob_type: &str,
        output: Option<&mut [u8]>,
        flags: u32,
    ) -> std::result::Result<usize, SecurityStatus> {
        let f = self.table().export_key.ok_or_else(missing)?;
        let blob_type = wide(blob_type);
        let (buffer, capacity) = match output {
            Some(buffer) => {
                let capacity =
                    u32::try_from(buffer.len()).map_err(|_| SecurityStatus::INVALID_PARAMETER)?;
                (buffer.as_mut_ptr(), capacity)
            }
            None => (ptr::null_mut(), 0),
        };
        let mut written: u32 = 0;
        // SAFETY: `buffer` is null or valid for `capacity` bytes; no export key
        // and no parameter list are passed.
        status(unsafe {
            f(
                provider,
                key,
                0,
                blob_type.as_ptr(),
                ptr::null(),
                buffer,
                capacity,
                &mut written,
                flags,
            )
        })?;
        Ok(written as usize)
    }

    fn free_buffer(&self, buffer: RawHandle) -> SecurityStatus {
        match self.table().free_buffer {
            // SAFETY: `buffer` was allocated by this provider.
            Some(f) => SecurityStatus(unsafe { f(buffer as *mut c_void) }),
            None => missing(),
        }
    }

    fn free_key(&self, provider: RawHandle, key: RawHandle) -> SecurityStatus {
        match self.table().free_key {
            // SAFETY: both handles were opened by this provider.
            Some(f) => SecurityStatus(unsafe { f(provider, key) }),
            None => missing(),
        }
    }

    fn free_provider(&self, provider: RawHandle) -> SecurityStatus {
        match self.table().free_provider {
            // SAFETY: `provider` was opened by this provider.
            Some(f) => SecurityStatus(unsafe { f(provider) }),
            None => missing(),
        }
    }
}

/// Loads the configured provider module and resolves its function table.
pub fn load(config: &ProviderConfig) -> Result<Backend<NativeProvider, LayoutPolicyOverride>> {
    let library = ProviderLibrary::load(&config.library)?;
    let provider = NativeProvider::open(library)?;
    // SAFETY: key handles come from the software KSP table just resolved,
    // whose key objects follow SOFTWARE_KSP_LAYOUT.
    let policy = unsafe { LayoutPolicyOverride::new(SOFTWARE_KSP_LAYOUT) };
    Ok(Backend { provider, policy })
}
