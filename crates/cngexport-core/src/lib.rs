//! Client for the CNG key storage provider function table: enumerate the
//! machine's keys and export one of them, whatever its export policy says.

pub mod enumerate;
pub mod error;
pub mod export;
pub mod native;
pub mod policy;
pub mod provider;
pub mod runner;
pub mod session;
pub mod sink;
pub mod status;

#[cfg(test)]
pub(crate) mod mock;

pub use enumerate::KeyNames;
pub use error::{KspError, Result};
pub use export::{ExportOptions, ExportedKey, KeyBlob, KeyExporter, KeyHandle, KeyName};
pub use policy::{LayoutPolicyOverride, PolicyLayout, PolicyOverride, SOFTWARE_KSP_LAYOUT};
pub use provider::{KeyEntry, KeyStorageProvider, RawHandle};
pub use runner::{execute, resolve_mode, run, Backend, Mode, RunOptions};
pub use session::ProviderSession;
pub use sink::PemFileSink;
pub use status::SecurityStatus;
