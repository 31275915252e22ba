//! Reliability matrix output types.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::contract::{FreshnessPolicy, Stage};

/// Matrix-level verdict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatrixStatus {
    Pass,
    Fail,
}

impl MatrixStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatrixStatus::Pass => "PASS",
            MatrixStatus::Fail => "FAIL",
        }
    }
}

/// Why an artifact is (or is not) considered fresh for this matrix run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessReason {
    Fresh,
    /// Freshness policy is `allow_latest`.
    NotEnforced,
    NotRegeneratedInThisRun,
    ProducerFailedOrNonzeroExit,
    ArtifactMissingAfterProducer,
    ArtifactTimestampBeforeMatrixStart,
    GeneratedAtUtcMissingOrUnparseable,
    GeneratedAtUtcBeforeMatrixStart,
}

impl FreshnessReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::NotEnforced => "not_enforced",
            Self::NotRegeneratedInThisRun => "not_regenerated_in_this_run",
            Self::ProducerFailedOrNonzeroExit => "producer_failed_or_nonzero_exit",
            Self::ArtifactMissingAfterProducer => "artifact_missing_after_producer",
            Self::ArtifactTimestampBeforeMatrixStart => "artifact_timestamp_before_matrix_start",
            Self::GeneratedAtUtcMissingOrUnparseable => "generated_at_utc_missing_or_unparseable",
            Self::GeneratedAtUtcBeforeMatrixStart => "generated_at_utc_before_matrix_start",
        }
    }

    pub fn is_ok(self) -> bool {
        matches!(self, Self::Fresh | Self::NotEnforced)
    }
}

impl std::fmt::Display for FreshnessReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-family problems recorded as data instead of being raised.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FamilyFailureKind {
    ArtifactMissing,
    ProducerFailure,
    FreshnessViolation,
    StatusNotAllowed,
    CanaryAlert,
    PersonaDrift,
}

/// One family's line in the matrix. Never mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FamilyRow {
    pub id: String,
    pub stage: Stage,
    pub artifact_path: PathBuf,
    pub status: String,
    pub first_failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failure_kinds: Vec<FamilyFailureKind>,
    pub producer_attempted: bool,
    pub producer_succeeded: bool,
    pub artifact_timestamp_fresh: bool,
    pub freshness_ok: bool,
    pub freshness_reason: FreshnessReason,
    pub generated_at: Option<DateTime<Utc>>,
    pub producer_exit_code: Option<i32>,
}

impl FamilyRow {
    pub fn is_missing(&self) -> bool {
        self.failure_kinds.contains(&FamilyFailureKind::ArtifactMissing)
    }

    pub fn status_allowed(&self) -> bool {
        !self.failure_kinds.contains(&FamilyFailureKind::StatusNotAllowed)
    }
}

/// How many required families produced an artifact at all.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Coverage {
    pub required_total: usize,
    pub produced_total: usize,
    /// `produced_total / required_total`, always within `[0, 1]`.
    pub coverage_rate: f64,
    pub missing_families: Vec<String>,
}

/// A family whose artifact was not produced during this run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FreshnessViolation {
    pub family: String,
    pub reason: FreshnessReason,
}

/// Result of one matrix build. Persisted, never updated in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatrixResult {
    pub run_id: String,
    pub contract_id: String,
    pub contract_version: String,
    pub freshness_policy: FreshnessPolicy,
    pub matrix_started_at: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub coverage: Coverage,
    pub families: Vec<FamilyRow>,
    pub failing_families: Vec<String>,
    pub freshness_violations: Vec<FreshnessViolation>,
    pub status: MatrixStatus,
    /// Human-readable `"<family>: <reason>"` lines.
    pub failures: Vec<String>,
}

impl MatrixResult {
    pub fn passed(&self) -> bool {
        self.status == MatrixStatus::Pass
    }

    /// Process exit code suitable for CI gating.
    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            1
        }
    }

    pub fn family(&self, id: &str) -> Option<&FamilyRow> {
        self.families.iter().find(|f| f.id == id)
    }
}
