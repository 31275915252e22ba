//! Error types for relgate-state

use thiserror::Error;

/// Errors raised by [`crate::StateStore`] implementations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Key is empty or contains characters outside `[A-Za-z0-9_.-]`
    #[error("Invalid state key: {key:?}")]
    InvalidKey { key: String },

    /// Digest string is not 64 hex characters
    #[error("Invalid digest: {digest}")]
    InvalidDigest { digest: String },

    /// Stored document could not be encoded or decoded
    #[error("Serialization failed for {key}: {message}")]
    Serialization { key: String, message: String },

    /// Underlying filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
