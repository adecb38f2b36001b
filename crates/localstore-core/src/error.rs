use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the localstore crates.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Why a single line of the record format was rejected.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    #[error("line starts with delimiter")]
    StartsWithDelimiter,
    #[error("missing delimiter")]
    MissingDelimiter,
}

/// Errors produced by stores, codecs and key management.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A line of the record format could not be parsed (1-based line number).
    #[error("malformed record on line {line}: {source}")]
    Format {
        line: usize,
        #[source]
        source: FormatError,
    },
    /// A key or value the line format cannot represent.
    #[error("record {key:?} cannot be stored: {reason}")]
    InvalidRecord { key: String, reason: &'static str },
    /// Key repair was attempted more times than the budget allows.
    #[error("attempts to regenerate keys have been exhausted")]
    KeyExhausted,
    /// An encrypted backing file exists but no usable keypair sits beside it.
    #[error("no usable keypair in {}", dir.display())]
    KeyPairMissing { dir: PathBuf },
    /// Filesystem failure.
    #[error("io failure at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Cryptographic failure that is not recoverable by key repair.
    #[error("crypto failure: {reason}")]
    Crypto { reason: String },
    /// Builder or runtime configuration rejected.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl StoreError {
    /// Wraps an io error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn crypto(reason: impl ToString) -> Self {
        StoreError::Crypto {
            reason: reason.to_string(),
        }
    }
}
