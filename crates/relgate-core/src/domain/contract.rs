//! Release contract: which evaluation families must be produced and how.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::artifact::{normalize_status, STATUS_PASS};

/// Whether artifacts must be regenerated during the current matrix run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessPolicy {
    MustRegenerateThisRun,
    AllowLatest,
}

impl FreshnessPolicy {
    pub fn is_enforced(self) -> bool {
        matches!(self, Self::MustRegenerateThisRun)
    }
}

/// How a canary alert is treated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CanaryPolicy {
    /// Alerts fail the family regardless of stage.
    Strict,
    /// Alerts are warnings until the family reaches the target stage.
    Triage,
}

/// Rollout stage of an evaluation family.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Observe,
    Ramp,
    /// Terminal release stage.
    Target,
    Custom,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Observe => "observe",
            Stage::Ramp => "ramp",
            Stage::Target => "target",
            Stage::Custom => "custom",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "observe" => Ok(Stage::Observe),
            "ramp" => Ok(Stage::Ramp),
            "target" => Ok(Stage::Target),
            "custom" => Ok(Stage::Custom),
            other => Err(format!("unknown stage: {other}")),
        }
    }
}

fn default_allowed_statuses() -> BTreeSet<String> {
    BTreeSet::from([STATUS_PASS.to_string()])
}

/// One required evaluation family.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FamilySpec {
    pub id: String,

    /// Where the family's combined summary artifact lives.
    pub artifact_path: PathBuf,

    #[serde(default)]
    pub stage: Stage,

    /// Overrides the contract's `default_canary_policy` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canary_policy: Option<CanaryPolicy>,

    #[serde(default = "default_allowed_statuses")]
    pub allowed_statuses: BTreeSet<String>,

    /// Canary exact-match rate at or above which an alert is raised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canary_alert_threshold: Option<f64>,
}

impl FamilySpec {
    pub fn new(id: impl Into<String>, artifact_path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            artifact_path: artifact_path.into(),
            stage: Stage::default(),
            canary_policy: None,
            allowed_statuses: default_allowed_statuses(),
            canary_alert_threshold: None,
        }
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    pub fn with_allowed_statuses<I, S>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_statuses = statuses.into_iter().map(|s| normalize_status(s.as_ref())).collect();
        self
    }

    pub fn effective_canary_policy(&self, default: CanaryPolicy) -> CanaryPolicy {
        self.canary_policy.unwrap_or(default)
    }

    /// Whether `status` is in this family's allowed set (case-insensitive).
    pub fn allows(&self, status: &str) -> bool {
        let status = normalize_status(status);
        self.allowed_statuses
            .iter()
            .any(|allowed| normalize_status(allowed) == status)
    }
}

/// Release contract. Immutable per run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contract {
    pub contract_id: String,
    pub version: String,
    pub freshness_policy: FreshnessPolicy,
    pub default_canary_policy: CanaryPolicy,
    pub required_families: Vec<FamilySpec>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_family_defaults() {
        let spec: FamilySpec =
            serde_json::from_value(json!({"id": "compression", "artifact_path": "out/c.json"}))
                .expect("deserialize");
        assert_eq!(spec.stage, Stage::Observe);
        assert!(spec.allows("PASS"));
        assert!(spec.allows("pass"));
        assert!(!spec.allows("FAIL"));
        assert_eq!(spec.effective_canary_policy(CanaryPolicy::Triage), CanaryPolicy::Triage);
    }

    #[test]
    fn test_canary_policy_override() {
        let mut spec = FamilySpec::new("x", "x.json");
        spec.canary_policy = Some(CanaryPolicy::Strict);
        assert_eq!(spec.effective_canary_policy(CanaryPolicy::Triage), CanaryPolicy::Strict);
    }

    #[test]
    fn test_stage_parse() {
        assert_eq!("TARGET".parse::<Stage>().unwrap(), Stage::Target);
        assert!("prod".parse::<Stage>().is_err());
    }

    #[test]
    fn test_freshness_policy_wire_names() {
        let p: FreshnessPolicy = serde_json::from_value(json!("must_regenerate_this_run")).unwrap();
        assert!(p.is_enforced());
        let p: FreshnessPolicy = serde_json::from_value(json!("allow_latest")).unwrap();
        assert!(!p.is_enforced());
    }
}
