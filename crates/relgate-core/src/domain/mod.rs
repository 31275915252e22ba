//! Domain types shared by the controller components.

pub mod artifact;
pub mod contract;
pub mod error;
pub mod matrix;

pub use artifact::{
    normalize_status, ArtifactRecord, STATUS_FAIL, STATUS_MISSING, STATUS_PASS, STATUS_STALE,
    STATUS_UNKNOWN,
};
pub use contract::{CanaryPolicy, Contract, FamilySpec, FreshnessPolicy, Stage};
pub use error::{RelgateError, Result};
pub use matrix::{
    Coverage, FamilyFailureKind, FamilyRow, FreshnessReason, FreshnessViolation, MatrixResult,
    MatrixStatus,
};
