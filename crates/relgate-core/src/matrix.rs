//! Reliability matrix aggregator.
//!
//! Walks the contract's families in order, optionally invokes each family's
//! producer, reads the resulting artifact fresh from disk, and folds
//! status, freshness and allowed-status membership into one
//! [`MatrixResult`]. Per-family problems are recorded on the rows; only a
//! producer failure without `continue_on_run_failure`, or an overlapping
//! producer, aborts the build.

use chrono::{DateTime, SubsecRound, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::artifact_store::ArtifactStore;
use crate::contract::ValidatedContract;
use crate::domain::{
    ArtifactRecord, Contract, Coverage, FamilyFailureKind, FamilyRow, FamilySpec,
    FreshnessPolicy, FreshnessReason, FreshnessViolation, MatrixResult, MatrixStatus,
    RelgateError, Result,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::producer::{FamilyProducer, ProducerRequest};

/// Knobs for one matrix build.
#[derive(Debug, Clone)]
pub struct MatrixOptions {
    pub run_id: String,
    /// Skip producers and aggregate whatever artifacts are already on disk.
    pub reuse_existing: bool,
    /// Record non-zero producer exits on the row instead of aborting.
    pub continue_on_run_failure: bool,
}

impl Default for MatrixOptions {
    fn default() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            reuse_existing: false,
            continue_on_run_failure: false,
        }
    }
}

/// Whether and how the producer ran for one family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProducerReport {
    pub attempted: bool,
    pub succeeded: bool,
    pub exit_code: Option<i32>,
}

impl ProducerReport {
    pub fn skipped() -> Self {
        Self::default()
    }

    pub fn finished(exit_code: i32) -> Self {
        Self {
            attempted: true,
            succeeded: exit_code == 0,
            exit_code: Some(exit_code),
        }
    }
}

/// Producers often stamp whole seconds; compare against the truncated start.
fn freshness_floor(started_at: DateTime<Utc>) -> DateTime<Utc> {
    started_at.trunc_subsecs(0)
}

fn timestamp_fresh(record: &ArtifactRecord, floor: DateTime<Utc>) -> bool {
    record.exists
        && record
            .modified_at
            .or(record.generated_at)
            .map(|ts| ts >= floor)
            .unwrap_or(false)
}

/// Decide whether an artifact was produced during this matrix run.
///
/// Returns the reason plus whether the on-disk timestamp alone is fresh.
pub fn assess_freshness(
    policy: FreshnessPolicy,
    producer: &ProducerReport,
    record: &ArtifactRecord,
    started_at: DateTime<Utc>,
) -> (FreshnessReason, bool) {
    let floor = freshness_floor(started_at);
    let ts_fresh = timestamp_fresh(record, floor);

    if !policy.is_enforced() {
        return (FreshnessReason::NotEnforced, ts_fresh);
    }
    if !producer.attempted {
        return (FreshnessReason::NotRegeneratedInThisRun, ts_fresh);
    }
    if !producer.succeeded {
        return (FreshnessReason::ProducerFailedOrNonzeroExit, ts_fresh);
    }
    if !record.exists {
        return (FreshnessReason::ArtifactMissingAfterProducer, ts_fresh);
    }
    if !ts_fresh {
        return (FreshnessReason::ArtifactTimestampBeforeMatrixStart, ts_fresh);
    }
    match record.generated_at {
        None => (FreshnessReason::GeneratedAtUtcMissingOrUnparseable, ts_fresh),
        Some(ts) if ts < floor => (FreshnessReason::GeneratedAtUtcBeforeMatrixStart, ts_fresh),
        Some(_) => (FreshnessReason::Fresh, ts_fresh),
    }
}

/// Build one family's row from its spec, artifact record and producer report.
pub fn evaluate_family(
    spec: &FamilySpec,
    record: &ArtifactRecord,
    producer: &ProducerReport,
    policy: FreshnessPolicy,
    started_at: DateTime<Utc>,
) -> FamilyRow {
    let (freshness_reason, artifact_timestamp_fresh) =
        assess_freshness(policy, producer, record, started_at);
    let freshness_ok = freshness_reason.is_ok();

    let mut failure_kinds = Vec::new();
    let mut reasons: Vec<String> = Vec::new();

    if producer.attempted && !producer.succeeded {
        failure_kinds.push(FamilyFailureKind::ProducerFailure);
        reasons.push(format!(
            "producer_exit_code:{}",
            producer.exit_code.unwrap_or(-1)
        ));
    }
    if !record.exists {
        failure_kinds.push(FamilyFailureKind::ArtifactMissing);
        reasons.push("artifact_missing".to_string());
    }
    if !freshness_ok {
        failure_kinds.push(FamilyFailureKind::FreshnessViolation);
        reasons.push(freshness_reason.as_str().to_string());
    }
    if record.exists && !spec.allows(&record.status) {
        failure_kinds.push(FamilyFailureKind::StatusNotAllowed);
        reasons.push(
            record
                .declared_failure
                .clone()
                .unwrap_or_else(|| format!("status_not_allowed:{}", record.status)),
        );
    }

    FamilyRow {
        id: spec.id.clone(),
        stage: spec.stage,
        artifact_path: record.path.clone(),
        status: record.status.clone(),
        first_failure_reason: reasons.into_iter().next(),
        failure_kinds,
        producer_attempted: producer.attempted,
        producer_succeeded: producer.succeeded,
        artifact_timestamp_fresh,
        freshness_ok,
        freshness_reason,
        generated_at: record.generated_at,
        producer_exit_code: producer.exit_code,
    }
}

fn failure_lines(row: &FamilyRow, spec: &FamilySpec) -> Vec<String> {
    let mut lines = Vec::new();
    for kind in &row.failure_kinds {
        let line = match kind {
            FamilyFailureKind::ProducerFailure => format!(
                "{}: producer exited with code {}",
                row.id,
                row.producer_exit_code.unwrap_or(-1)
            ),
            FamilyFailureKind::ArtifactMissing => format!(
                "{}: artifact missing ({})",
                row.id,
                row.artifact_path.display()
            ),
            FamilyFailureKind::FreshnessViolation => {
                format!("{}: freshness violation ({})", row.id, row.freshness_reason)
            }
            FamilyFailureKind::StatusNotAllowed => format!(
                "{}: status {} not in allowed [{}]",
                row.id,
                row.status,
                spec.allowed_statuses
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            FamilyFailureKind::CanaryAlert | FamilyFailureKind::PersonaDrift => continue,
        };
        lines.push(line);
    }
    lines
}

/// Fold rows into the matrix-level verdict.
pub fn summarize(
    contract: &Contract,
    run_id: &str,
    started_at: DateTime<Utc>,
    generated_at: DateTime<Utc>,
    rows: Vec<FamilyRow>,
) -> MatrixResult {
    let required_total = rows.len();
    let missing_families: Vec<String> = rows
        .iter()
        .filter(|r| r.is_missing())
        .map(|r| r.id.clone())
        .collect();
    let produced_total = required_total - missing_families.len();
    let coverage_rate = if required_total == 0 {
        0.0
    } else {
        produced_total as f64 / required_total as f64
    };

    let failing_families: Vec<String> = rows
        .iter()
        .filter(|r| !r.is_missing() && !r.status_allowed())
        .map(|r| r.id.clone())
        .collect();

    let enforce = contract.freshness_policy.is_enforced();
    let freshness_violations: Vec<FreshnessViolation> = if enforce {
        rows.iter()
            .filter(|r| !r.freshness_ok)
            .map(|r| FreshnessViolation {
                family: r.id.clone(),
                reason: r.freshness_reason,
            })
            .collect()
    } else {
        Vec::new()
    };

    let failures = rows
        .iter()
        .zip(&contract.required_families)
        .flat_map(|(row, spec)| failure_lines(row, spec))
        .collect();

    let status = if missing_families.is_empty()
        && failing_families.is_empty()
        && freshness_violations.is_empty()
    {
        MatrixStatus::Pass
    } else {
        MatrixStatus::Fail
    };

    MatrixResult {
        run_id: run_id.to_string(),
        contract_id: contract.contract_id.clone(),
        contract_version: contract.version.clone(),
        freshness_policy: contract.freshness_policy,
        matrix_started_at: started_at,
        generated_at,
        coverage: Coverage {
            required_total,
            produced_total,
            coverage_rate,
            missing_families,
        },
        families: rows,
        failing_families,
        freshness_violations,
        status,
        failures,
    }
}

/// Build the reliability matrix for a validated contract.
///
/// Families are processed sequentially in contract order; at most one
/// producer runs at a time.
pub async fn build_matrix(
    contract: &ValidatedContract,
    producer: &dyn FamilyProducer,
    store: &ArtifactStore,
    options: &MatrixOptions,
    started_at: DateTime<Utc>,
) -> Result<MatrixResult> {
    let policy = contract.contract().freshness_policy;
    obs::emit_matrix_started(
        &options.run_id,
        &contract.contract().contract_id,
        contract.families().len(),
    );

    let mut rows = Vec::with_capacity(contract.families().len());
    for spec in contract.families() {
        let artifact_path = store.resolve_path(&spec.artifact_path);

        let report = if options.reuse_existing {
            ProducerReport::skipped()
        } else {
            info!(family = %spec.id, stage = %spec.stage, "invoking producer");
            METRICS.inc_producers_invoked();
            let request = ProducerRequest {
                family: spec,
                artifact_path: &artifact_path,
                run_id: &options.run_id,
                matrix_started_at: started_at,
            };
            let exit_code = match producer.produce(&request).await {
                Ok(outcome) => outcome.exit_code,
                Err(e @ RelgateError::ProducerBusy { .. }) => return Err(e),
                Err(e) => {
                    warn!(family = %spec.id, error = %e, "producer could not be run");
                    -1
                }
            };
            if exit_code != 0 && !options.continue_on_run_failure {
                warn!(family = %spec.id, exit_code, "producer failed; aborting matrix");
                return Err(RelgateError::ProducerFailure {
                    family: spec.id.clone(),
                    exit_code,
                });
            }
            ProducerReport::finished(exit_code)
        };

        let record = store.read_record(&artifact_path);
        let row = evaluate_family(spec, &record, &report, policy, started_at);
        METRICS.inc_families_evaluated();
        obs::emit_family_evaluated(&options.run_id, &row);
        rows.push(row);
    }

    let result = summarize(
        contract.contract(),
        &options.run_id,
        started_at,
        Utc::now(),
        rows,
    );
    obs::emit_matrix_finished(
        &options.run_id,
        result.status.as_str(),
        result.coverage.coverage_rate,
        result.failing_families.len(),
        result.freshness_violations.len(),
    );
    Ok(result)
}
