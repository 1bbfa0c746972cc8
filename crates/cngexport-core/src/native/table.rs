//! `ncrypt_provider.h` layouts, only as far as this crate reads them.

#![allow(dead_code)]

use std::ffi::c_void;

pub type SecurityStatusRaw = i32;

pub type OpenProviderFn =
    unsafe extern "system" fn(*mut usize, *const u16, u32) -> SecurityStatusRaw;
pub type OpenKeyFn =
    unsafe extern "system" fn(usize, *mut usize, *const u16, u32, u32) -> SecurityStatusRaw;
pub type FreeProviderFn = unsafe extern "system" fn(usize) -> SecurityStatusRaw;
pub type FreeKeyFn = unsafe extern "system" fn(usize, usize) -> SecurityStatusRaw;
pub type FreeBufferFn = unsafe extern "system" fn(*mut c_void) -> SecurityStatusRaw;
pub type EnumKeysFn = unsafe extern "system" fn(
    usize,
    *const u16,
    *mut *mut NCryptKeyName,
    *mut *mut c_void,
    u32,
) -> SecurityStatusRaw;
pub type ExportKeyFn = unsafe extern "system" fn(
    usize,
    usize,
    usize,
    *const u16,
    *const c_void,
    *mut u8,
    u32,
    *mut u32,
    u32,
) -> SecurityStatusRaw;

pub type GetKeyStorageInterfaceFn = unsafe extern "system" fn(
    *const u16,
    *mut *const KeyStorageFunctionTable,
    u32,
) -> SecurityStatusRaw;

#[repr(C)]
pub struct InterfaceVersion {
    pub major: u16,
    pub minor: u16,
}

/// `NCRYPT_KEY_STORAGE_FUNCTION_TABLE`, truncated after `ExportKey`.
/// Entries this crate never calls are kept as pointer-sized placeholders so
/// the offsets of the ones it does call stay right.
#[repr(C)]
pub struct KeyStorageFunctionTable {
    pub version: InterfaceVersion,
    pub open_provider: Option<OpenProviderFn>,
    pub open_key: Option<OpenKeyFn>,
    pub create_persisted_key: usize,
    pub get_provider_property: usize,
    pub get_key_property: usize,
    pub set_provider_property: usize,
    pub set_key_property: usize,
    pub finalize_key: usize,
    pub delete_key: usize,
    pub free_provider: Option<FreeProviderFn>,
    pub free_key: Option<FreeKeyFn>,
    pub free_buffer: Option<FreeBufferFn>,
    pub encrypt: usize,
    pub decrypt: usize,
    pub is_alg_supported: usize,
    pub enum_algorithms: usize,
    pub enum_keys: Option<EnumKeysFn>,
    pub import_key: usize,
    pub export_key: Option<ExportKeyFn>,
}

/// `NCryptKeyName`
#[repr(C)]
pub struct NCryptKeyName {
    pub name: *mut u16,
    pub algid: *mut u16,
    pub legacy_key_spec: u32,
    pub flags: u32,
}
