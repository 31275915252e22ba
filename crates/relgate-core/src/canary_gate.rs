//! Canary / persona hard gate for a single evaluation family.
//!
//! Three independent checks combine with AND:
//!
//! 1. anchors and holdout both `PASS`;
//! 2. the canary split (designed to be unsolvable) does not score at or above
//!    its alert threshold, or the alert is only a warning because the canary
//!    gate is not enforced for this family yet;
//! 3. every persona-perturbed row produced the same prediction as the
//!    canonical prompt (`row_invariance_rate >= 1.0`).
//!
//! The report is embedded into the family's combined summary artifact.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use relgate_state::ContentDigest;

use crate::artifact_store::{extract_f64, ArtifactStore};
use crate::domain::{
    CanaryPolicy, FamilyFailureKind, Result, Stage, STATUS_FAIL, STATUS_PASS, STATUS_STALE,
};
use crate::obs;

/// Alert threshold used when the contract does not set one.
pub const DEFAULT_CANARY_ALERT_THRESHOLD: f64 = 0.90;

const CANARY_RATE_POINTERS: [&str; 4] = [
    "/exact_match_rate",
    "/means/exact_match",
    "/overall/exact_match_rate",
    "/metrics/exact_match_rate",
];
const PERSONA_RATE_POINTERS: [&str; 2] = ["/row_invariance_rate", "/overall/row_invariance_rate"];

/// Split file names inside a family's split directory.
pub const ANCHORS_FILE: &str = "anchors.json";
pub const HOLDOUT_FILE: &str = "holdout.json";
pub const CANARY_FILE: &str = "canary.json";
pub const PERSONA_FILE: &str = "persona.json";

/// Canary observation for one family.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanaryMetrics {
    pub exact_match_rate: f64,
}

/// Persona-invariance observation for one family.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonaMetrics {
    /// `None` when the check could not be completed.
    pub row_invariance_rate: Option<f64>,
    pub rows_total: Option<u64>,
    pub rows_changed: Option<u64>,
}

/// Everything the gate needs about one family.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FamilyGateInputs {
    pub family: String,
    pub stage: Stage,
    pub anchors_status: String,
    pub holdout_status: String,
    pub canary: Option<CanaryMetrics>,
    pub persona: Option<PersonaMetrics>,
}

/// How strictly to apply the gate.
#[derive(Debug, Clone, PartialEq)]
pub struct GateOptions {
    pub canary_policy: CanaryPolicy,
    pub canary_alert_threshold: f64,
    /// Enforce the canary gate regardless of stage.
    pub force_strict_canary: bool,
    /// When false, a missing persona check does not fail the family.
    pub require_persona: bool,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            canary_policy: CanaryPolicy::Triage,
            canary_alert_threshold: DEFAULT_CANARY_ALERT_THRESHOLD,
            force_strict_canary: false,
            require_persona: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum CanaryStatus {
    Ok,
    Warn,
    Missing,
}

impl CanaryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CanaryStatus::Ok => "OK",
            CanaryStatus::Warn => "WARN",
            CanaryStatus::Missing => "MISSING",
        }
    }
}

/// Why a family's hard gate failed, first failing check wins.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    AnchorsOrHoldoutFailed,
    CanaryAlert,
    CanaryMissing,
    /// Persona check could not be completed.
    PersonaContractDrift,
    /// Persona check completed but some rows changed.
    PersonaInvarianceDrift,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HardGateCheck {
    pub anchors_status: String,
    pub holdout_status: String,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanaryCheck {
    pub exact_match_rate: Option<f64>,
    pub alert_threshold: f64,
    pub canary_status: CanaryStatus,
    pub canary_gate_enforced: bool,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonaCheck {
    pub row_invariance_rate: Option<f64>,
    pub rows_total: Option<u64>,
    pub rows_changed: Option<u64>,
    pub completed: bool,
    pub passed: bool,
}

/// Combined gate outcome, embedded into the family summary for audit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FamilyGateReport {
    pub family: String,
    pub stage: Stage,
    pub status: String,
    pub hard_gate: HardGateCheck,
    pub canary: CanaryCheck,
    pub persona: PersonaCheck,
    pub failure_category: Option<FailureCategory>,
    pub failure_kinds: Vec<FamilyFailureKind>,
    pub failures: Vec<String>,
}

impl FamilyGateReport {
    pub fn passed(&self) -> bool {
        self.status == STATUS_PASS
    }
}

/// Whether canary alerts fail the family rather than warn.
pub fn canary_gate_enforced(stage: Stage, options: &GateOptions) -> bool {
    stage == Stage::Target
        || options.force_strict_canary
        || options.canary_policy == CanaryPolicy::Strict
}

/// Evaluate the three sub-gates and AND them together.
pub fn evaluate_family_gate(inputs: &FamilyGateInputs, options: &GateOptions) -> FamilyGateReport {
    let mut failures = Vec::new();
    let mut failure_kinds = Vec::new();
    let mut category = None;

    let hard_ok = inputs.anchors_status == STATUS_PASS && inputs.holdout_status == STATUS_PASS;
    if !hard_ok {
        category.get_or_insert(FailureCategory::AnchorsOrHoldoutFailed);
        failures.push(format!(
            "anchors={} holdout={}",
            inputs.anchors_status, inputs.holdout_status
        ));
    }

    let enforced = canary_gate_enforced(inputs.stage, options);
    let threshold = options.canary_alert_threshold;
    let (canary_status, rate) = match &inputs.canary {
        None => (CanaryStatus::Missing, None),
        Some(c) if c.exact_match_rate >= threshold => (CanaryStatus::Warn, Some(c.exact_match_rate)),
        Some(c) => (CanaryStatus::Ok, Some(c.exact_match_rate)),
    };
    let canary_ok = match canary_status {
        CanaryStatus::Ok => true,
        CanaryStatus::Warn | CanaryStatus::Missing => !enforced,
    };
    if canary_status == CanaryStatus::Warn {
        failure_kinds.push(FamilyFailureKind::CanaryAlert);
        let rate = rate.unwrap_or_default();
        if enforced {
            category.get_or_insert(FailureCategory::CanaryAlert);
            failures.push(format!(
                "canary exact_match_rate {rate:.3} >= alert threshold {threshold:.3} (enforced)"
            ));
        }
    }
    if canary_status == CanaryStatus::Missing && enforced {
        category.get_or_insert(FailureCategory::CanaryMissing);
        failures.push("canary split missing while canary gate is enforced".to_string());
    }

    let persona = inputs.persona.clone().unwrap_or(PersonaMetrics {
        row_invariance_rate: None,
        rows_total: None,
        rows_changed: None,
    });
    let completed = persona.row_invariance_rate.is_some();
    let persona_ok = match persona.row_invariance_rate {
        Some(rate) => rate >= 1.0,
        None => !options.require_persona,
    };
    if !persona_ok {
        failure_kinds.push(FamilyFailureKind::PersonaDrift);
        if completed {
            category.get_or_insert(FailureCategory::PersonaInvarianceDrift);
            failures.push(format!(
                "persona row_invariance_rate {:.3} < 1.0",
                persona.row_invariance_rate.unwrap_or_default()
            ));
        } else {
            category.get_or_insert(FailureCategory::PersonaContractDrift);
            failures.push("persona invariance check did not complete".to_string());
        }
    }

    let passed = hard_ok && canary_ok && persona_ok;
    let status = if passed { STATUS_PASS } else { STATUS_FAIL };
    obs::emit_gate_evaluated(&inputs.family, status, canary_status.as_str(), enforced);

    FamilyGateReport {
        family: inputs.family.clone(),
        stage: inputs.stage,
        status: status.to_string(),
        hard_gate: HardGateCheck {
            anchors_status: inputs.anchors_status.clone(),
            holdout_status: inputs.holdout_status.clone(),
            passed: hard_ok,
        },
        canary: CanaryCheck {
            exact_match_rate: rate,
            alert_threshold: threshold,
            canary_status,
            canary_gate_enforced: enforced,
            passed: canary_ok,
        },
        persona: PersonaCheck {
            row_invariance_rate: persona.row_invariance_rate,
            rows_total: persona.rows_total,
            rows_changed: persona.rows_changed,
            completed,
            passed: persona_ok,
        },
        failure_category: if passed { None } else { category },
        failure_kinds,
        failures,
    }
}

/// Read split artifacts from `split_dir` into gate inputs.
///
/// With `not_before` set, splits written before that instant (truncated to
/// whole seconds) are ignored: anchors and holdout read as `STALE`, canary
/// and persona as absent. Unreadable or malformed canary and persona files
/// are also absent; they surface as gate failures, never as errors.
pub fn load_gate_inputs(
    store: &ArtifactStore,
    family: &str,
    stage: Stage,
    split_dir: &Path,
    not_before: Option<DateTime<Utc>>,
) -> FamilyGateInputs {
    let floor = not_before.map(|ts| ts.trunc_subsecs(0));
    let current = |name: &str| -> bool {
        floor.map_or(true, |floor| {
            store
                .read_record(&split_dir.join(name))
                .produced_since(floor)
        })
    };
    let split_status = |name: &str| -> String {
        let record = store.read_record(&split_dir.join(name));
        match floor {
            Some(floor) if record.exists && !record.produced_since(floor) => {
                warn!(family, split = name, path = %record.path.display(), "split predates this run");
                STATUS_STALE.to_string()
            }
            _ => record.status,
        }
    };
    let read_split = |name: &str| -> Option<Value> {
        if !current(name) {
            return None;
        }
        match store.read_json(&split_dir.join(name)) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(family, split = name, error = %e, "unreadable split");
                None
            }
        }
    };

    let canary = read_split(CANARY_FILE)
        .and_then(|doc| extract_f64(&doc, &CANARY_RATE_POINTERS))
        .map(|exact_match_rate| CanaryMetrics { exact_match_rate });

    let persona = read_split(PERSONA_FILE).map(|doc| PersonaMetrics {
        row_invariance_rate: extract_f64(&doc, &PERSONA_RATE_POINTERS),
        rows_total: doc.get("rows_total").and_then(|v| v.as_u64()),
        rows_changed: doc.get("rows_changed").and_then(|v| v.as_u64()),
    });

    FamilyGateInputs {
        family: family.to_string(),
        stage,
        anchors_status: split_status(ANCHORS_FILE),
        holdout_status: split_status(HOLDOUT_FILE),
        canary,
        persona,
    }
}

/// Write the family's combined summary: top-level `status`, a fresh
/// `generated_at_utc`, the split paths, and the full gate report.
pub fn write_family_summary(
    store: &ArtifactStore,
    summary_path: &Path,
    split_dir: &Path,
    report: &FamilyGateReport,
    generated_at: DateTime<Utc>,
) -> Result<ContentDigest> {
    let split = |name: &str| -> PathBuf { store.resolve_path(&split_dir.join(name)) };

    let doc = json!({
        "family": report.family,
        "stage": report.stage,
        "status": report.status,
        "generated_at_utc": generated_at.to_rfc3339(),
        "first_failure_reason": report.failures.first(),
        "splits": {
            "anchors": {"path": split(ANCHORS_FILE), "status": report.hard_gate.anchors_status},
            "holdout": {"path": split(HOLDOUT_FILE), "status": report.hard_gate.holdout_status},
            "canary": {"path": split(CANARY_FILE), "status": report.canary.canary_status},
            "persona": {"path": split(PERSONA_FILE), "completed": report.persona.completed},
        },
        "hard_gate": report,
    });
    store.write_json(summary_path, &doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(stage: Stage, canary: Option<f64>, persona: Option<f64>) -> FamilyGateInputs {
        FamilyGateInputs {
            family: "rpa_mode_switch".to_string(),
            stage,
            anchors_status: "PASS".to_string(),
            holdout_status: "PASS".to_string(),
            canary: canary.map(|r| CanaryMetrics { exact_match_rate: r }),
            persona: persona.map(|r| PersonaMetrics {
                row_invariance_rate: Some(r),
                rows_total: Some(10),
                rows_changed: Some(0),
            }),
        }
    }

    #[test]
    fn target_stage_enforces_canary_alert() {
        let report = evaluate_family_gate(
            &inputs(Stage::Target, Some(0.97), Some(1.0)),
            &GateOptions::default(),
        );
        assert_eq!(report.canary.canary_status, CanaryStatus::Warn);
        assert!(report.canary.canary_gate_enforced);
        assert!(report.hard_gate.passed);
        assert!(!report.passed());
        assert_eq!(report.failure_category, Some(FailureCategory::CanaryAlert));
    }

    #[test]
    fn observe_stage_only_warns() {
        let report = evaluate_family_gate(
            &inputs(Stage::Observe, Some(0.97), Some(1.0)),
            &GateOptions::default(),
        );
        assert_eq!(report.canary.canary_status, CanaryStatus::Warn);
        assert!(!report.canary.canary_gate_enforced);
        assert!(report.passed());
        assert!(report.failure_kinds.contains(&FamilyFailureKind::CanaryAlert));
    }

    #[test]
    fn explicit_strict_enforces_regardless_of_stage() {
        let options = GateOptions {
            force_strict_canary: true,
            ..GateOptions::default()
        };
        let report = evaluate_family_gate(&inputs(Stage::Ramp, Some(0.95), Some(1.0)), &options);
        assert!(report.canary.canary_gate_enforced);
        assert!(!report.passed());
    }

    #[test]
    fn threshold_is_inclusive() {
        let report = evaluate_family_gate(
            &inputs(Stage::Target, Some(0.90), Some(1.0)),
            &GateOptions::default(),
        );
        assert_eq!(report.canary.canary_status, CanaryStatus::Warn);
        let report = evaluate_family_gate(
            &inputs(Stage::Target, Some(0.10), Some(1.0)),
            &GateOptions::default(),
        );
        assert_eq!(report.canary.canary_status, CanaryStatus::Ok);
        assert!(report.passed());
    }

    #[test]
    fn any_persona_drift_fails() {
        let report = evaluate_family_gate(
            &inputs(Stage::Observe, Some(0.1), Some(0.99)),
            &GateOptions::default(),
        );
        assert!(!report.passed());
        assert_eq!(
            report.failure_category,
            Some(FailureCategory::PersonaInvarianceDrift)
        );
    }

    #[test]
    fn incomplete_persona_is_contract_drift() {
        let report = evaluate_family_gate(
            &inputs(Stage::Observe, Some(0.1), None),
            &GateOptions::default(),
        );
        assert!(!report.passed());
        assert_eq!(report.failure_category, Some(FailureCategory::PersonaContractDrift));

        let relaxed = GateOptions {
            require_persona: false,
            ..GateOptions::default()
        };
        assert!(evaluate_family_gate(&inputs(Stage::Observe, Some(0.1), None), &relaxed).passed());
    }

    #[test]
    fn holdout_failure_is_first_category() {
        let mut i = inputs(Stage::Target, Some(0.99), Some(0.5));
        i.holdout_status = "FAIL".to_string();
        let report = evaluate_family_gate(&i, &GateOptions::default());
        assert_eq!(report.failure_category, Some(FailureCategory::AnchorsOrHoldoutFailed));
        assert_eq!(report.failures.len(), 3);
    }
}
