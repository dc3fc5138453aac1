//! # MemBank Error Types
//!
//! Centralized error handling for the membank core library.

use thiserror::Error;

/// Result type alias for membank operations
pub type Result<T> = std::result::Result<T, BankError>;

/// Core error types for the cache bank
#[derive(Error, Debug)]
pub enum BankError {
    /// Call arguments cannot be canonicalized into a stable key
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// A value cannot be represented under the configured codec
    #[error("Value encoding failed: {0}")]
    Encoding(String),

    /// A single encoded value exceeds the per-function memory budget
    #[error("Entry of {size} bytes exceeds function budget of {limit} bytes")]
    EntryTooLarge { size: u64, limit: u64 },

    /// The serialized bank exceeds the configured file size ceiling
    #[error("Serialized bank of {size} bytes exceeds max file size of {limit} bytes")]
    FileSizeExceeded { size: u64, limit: u64 },

    /// File contents do not match the configured codec or snapshot shape
    #[error("Cache file decode failed: {0}")]
    LoadDecode(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure raised by a wrapped function itself
    #[error("Function error: {0}")]
    Function(#[source] anyhow::Error),
}

impl BankError {
    /// Create a configuration error from any displayable cause
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Wrap a failure produced by user code behind a memoized call
    pub fn function(err: impl Into<anyhow::Error>) -> Self {
        Self::Function(err.into())
    }

    /// Returns true for failures of the cache store step that the
    /// wrapper swallows after a successful recompute.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            Self::Encoding(_) | Self::EntryTooLarge { .. } | Self::KeyDerivation(_)
        )
    }
}
