//! The real provider back-end, reached through `ncryptprov.dll`.

#[cfg(windows)]
mod table;
#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use self::windows::{load, NativeProvider, ProviderLibrary};

#[cfg(not(windows))]
mod unsupported;
#[cfg(not(windows))]
pub use self::unsupported::{load, NativeProvider};

/// Entry point every key storage provider module exports.
pub const FACTORY_SYMBOL: &str = "GetKeyStorageInterface";

/// `dwFlags` for the factory: the local, non-legacy implementation.
pub const LOCAL_IMPLEMENTATION: u32 = 1;
