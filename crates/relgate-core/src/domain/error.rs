//! Domain-level error taxonomy for relgate.
//!
//! Only contract-level and filesystem-level problems are errors. Per-family
//! problems (missing artifacts, stale artifacts, canary alerts, persona
//! drift) are recorded as data, see [`crate::domain::matrix::FamilyFailureKind`].

use relgate_state::StorageError;

/// relgate domain errors.
#[derive(Debug, thiserror::Error)]
pub enum RelgateError {
    #[error("contract schema error: {0}")]
    ContractSchema(String),

    #[error("artifact missing: {path}")]
    ArtifactMissing { path: String },

    #[error("producer for family {family} exited with code {exit_code}")]
    ProducerFailure { family: String, exit_code: i32 },

    #[error("another producer is already running (pid {pid})")]
    ProducerBusy { pid: u32 },

    #[error("server unavailable: {0}")]
    ServerUnavailable(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("state store error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for relgate domain operations.
pub type Result<T> = std::result::Result<T, RelgateError>;
