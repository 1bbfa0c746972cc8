use crate::status::SecurityStatus;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KspError {
    #[error("at most one argument expected, got {count} arguments")]
    Usage { count: usize },
    #[error("could not load {library}: {reason}")]
    Load { library: String, reason: String },
    #[error("could not obtain {symbol} function from {library}")]
    Symbol { library: String, symbol: String },
    #[error("could not obtain provider interface ({status})")]
    Interface { status: SecurityStatus },
    #[error("could not open provider '{provider}' ({status})")]
    ProviderOpen {
        provider: String,
        status: SecurityStatus,
    },
    #[error("could not enumerate keys ({status})")]
    Enumeration { status: SecurityStatus },
    #[error("invalid key name {0:?}")]
    InvalidKeyName(String),
    #[error("could not open key '{name}' ({status})")]
    KeyNotFound {
        name: String,
        status: SecurityStatus,
    },
    #[error("key '{name}' is not exportable and policy override is disabled")]
    PolicyDenied { name: String },
    #[error("could not export key ({status})")]
    Export { status: SecurityStatus },
    #[error("export returned {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("could not allocate {0} bytes for key blob")]
    Allocation(usize),
    #[error("could not write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl KspError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        KspError::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            KspError::Usage { .. } => 2,
            _ => 1,
        }
    }
}

pub type Result<T, E = KspError> = std::result::Result<T, E>;
