//! relgate Core Library
//!
//! Domain types and control logic for the release reliability gate:
//! contract validation, artifact status extraction, reliability matrix
//! aggregation, canary/persona gating, holdout selection and policy ranking.
//! Process supervision lives in `relgate-runner`.

pub mod artifact_store;
pub mod canary_gate;
pub mod contract;
pub mod curriculum;
pub mod domain;
pub mod matrix;
pub mod metrics;
pub mod obs;
pub mod pareto;
pub mod producer;
pub mod reporting;
pub mod rotation;
pub mod telemetry;

pub use artifact_store::{
    extract_f64, extract_generated_at, parse_timestamp, ArtifactStore, FieldPath, StatusResolver,
    StatusStrategy,
};
pub use canary_gate::{
    canary_gate_enforced, evaluate_family_gate, load_gate_inputs, write_family_summary,
    CanaryCheck, CanaryMetrics, CanaryStatus, FailureCategory, FamilyGateInputs,
    FamilyGateReport, GateOptions, HardGateCheck, PersonaCheck, PersonaMetrics,
    DEFAULT_CANARY_ALERT_THRESHOLD,
};
pub use contract::{ContractValidator, ValidatedContract, CONTRACT_SCHEMA};
pub use curriculum::{
    select_next_holdout, CurriculumDecision, CurriculumReason, CurriculumSelector,
    CurriculumState, CurriculumThresholds, HoldoutMetrics, HoldoutReport, VariantMetrics,
};
pub use domain::{
    ArtifactRecord, CanaryPolicy, Contract, Coverage, FamilyFailureKind, FamilyRow, FamilySpec,
    FreshnessPolicy, FreshnessReason, FreshnessViolation, MatrixResult, MatrixStatus,
    RelgateError, Result, Stage,
};
pub use matrix::{assess_freshness, build_matrix, evaluate_family, summarize, MatrixOptions};
pub use pareto::{
    dominates, rank_policies, ComparisonRow, MetricDeltas, ParetoReport, PolicyMetrics,
    PolicyRow,
};
pub use producer::{FamilyProducer, ProducerOutcome, ProducerRequest, ProducerStep};
pub use reporting::{
    render_matrix_md, render_pareto_md, write_matrix_artifact, write_matrix_md,
    LATEST_MATRIX_POINTER,
};
pub use rotation::{HoldoutRotation, RotationPick, RotationState};

pub use metrics::METRICS;
pub use obs::RunSpan;
pub use telemetry::init_tracing;

/// relgate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
