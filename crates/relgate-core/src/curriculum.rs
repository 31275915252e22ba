//! Autocurriculum selector.
//!
//! Picks the holdout the next run should target from a [`HoldoutReport`].
//! Selection is a pure function of the report, the thresholds and the
//! currently used holdout; only [`CurriculumSelector`] touches state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use relgate_state::{load_typed, save_typed, ContentDigest, StateStore};

use crate::domain::{RelgateError, Result};
use crate::obs;

/// State-store key of the curriculum document.
pub const CURRICULUM_STATE_KEY: &str = "curriculum";

/// Decisions kept in the curriculum history.
pub const CURRICULUM_HISTORY_LIMIT: usize = 32;

/// Metrics of the main holdout.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HoldoutMetrics {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sa_beats_greedy_rate: Option<f64>,
    #[serde(default)]
    pub policy_task_pass_rate_min: Option<f64>,
    #[serde(default)]
    pub greedy_task_pass_rate_min: Option<f64>,
}

/// Metrics of one named holdout variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VariantMetrics {
    #[serde(default)]
    pub sa_beats_greedy_rate: Option<f64>,
    #[serde(default)]
    pub greedy_task_pass_rate_min: Option<f64>,
    #[serde(default)]
    pub policy_task_pass_rate_min: Option<f64>,
    #[serde(default)]
    pub excluded_from_distillation: bool,
}

/// Externally produced evaluation report; read-only input.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HoldoutReport {
    #[serde(default)]
    pub holdout: Option<HoldoutMetrics>,
    #[serde(default)]
    pub variant_breakdown: BTreeMap<String, VariantMetrics>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CurriculumThresholds {
    /// Minimum policy-vs-greedy gap for a holdout to be worth targeting.
    pub gap_min: f64,
    /// Pass rate at or above which a holdout counts as solved.
    pub solved_min: f64,
}

impl Default for CurriculumThresholds {
    fn default() -> Self {
        Self {
            gap_min: 0.10,
            solved_min: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CurriculumReason {
    HoldoutUnsolved,
    GapCandidate,
    CurriculumExhausted,
    /// The report carried no main holdout; the current one is kept.
    Fallback,
}

impl CurriculumReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HoldoutUnsolved => "holdout_unsolved",
            Self::GapCandidate => "gap_candidate",
            Self::CurriculumExhausted => "curriculum_exhausted",
            Self::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurriculumDecision {
    pub used_holdout: String,
    pub next_holdout: String,
    pub reason: CurriculumReason,
    pub exhausted: bool,
    /// Gap of the selected variant, set for `gap_candidate`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gap: Option<f64>,
}

/// Missing pass rates count as unsolved, missing gaps as zero.
fn rate(v: Option<f64>) -> f64 {
    v.filter(|x| x.is_finite()).unwrap_or(0.0)
}

/// Choose the next holdout. Deterministic and side-effect free.
pub fn select_next_holdout(
    report: &HoldoutReport,
    thresholds: &CurriculumThresholds,
    current_holdout: &str,
) -> CurriculumDecision {
    let main = match report.holdout.as_ref() {
        Some(h) => h,
        None => {
            return CurriculumDecision {
                used_holdout: current_holdout.to_string(),
                next_holdout: current_holdout.to_string(),
                reason: CurriculumReason::Fallback,
                exhausted: false,
                gap: None,
            }
        }
    };
    let used = main
        .name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(current_holdout)
        .to_string();

    let unsolved = rate(main.policy_task_pass_rate_min) < thresholds.solved_min
        || rate(main.greedy_task_pass_rate_min) < thresholds.solved_min;
    let main_gap = rate(main.sa_beats_greedy_rate);
    if unsolved || main_gap >= thresholds.gap_min {
        return CurriculumDecision {
            next_holdout: used.clone(),
            used_holdout: used,
            reason: CurriculumReason::HoldoutUnsolved,
            exhausted: false,
            gap: Some(main_gap),
        };
    }

    let best = report
        .variant_breakdown
        .iter()
        .filter(|(_, v)| !v.excluded_from_distillation)
        .map(|(name, v)| {
            (
                name,
                rate(v.sa_beats_greedy_rate),
                rate(v.greedy_task_pass_rate_min),
                rate(v.policy_task_pass_rate_min),
            )
        })
        .filter(|(_, gap, _, _)| *gap >= thresholds.gap_min)
        // largest gap, then weakest greedy baseline, then weakest policy, then name
        .min_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then(a.2.total_cmp(&b.2))
                .then(a.3.total_cmp(&b.3))
                .then(a.0.cmp(b.0))
        });

    match best {
        Some((name, gap, _, _)) => CurriculumDecision {
            used_holdout: used,
            next_holdout: name.clone(),
            reason: CurriculumReason::GapCandidate,
            exhausted: false,
            gap: Some(gap),
        },
        None => CurriculumDecision {
            next_holdout: used.clone(),
            used_holdout: used,
            reason: CurriculumReason::CurriculumExhausted,
            exhausted: true,
            gap: None,
        },
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurriculumEntry {
    pub decided_at: DateTime<Utc>,
    pub thresholds: CurriculumThresholds,
    pub decision: CurriculumDecision,
}

/// Persisted curriculum document: last decision plus bounded history.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CurriculumState {
    pub last: Option<CurriculumEntry>,
    #[serde(default)]
    pub history: Vec<CurriculumEntry>,
}

impl CurriculumState {
    pub fn record(&mut self, entry: CurriculumEntry) {
        self.history.push(entry.clone());
        if self.history.len() > CURRICULUM_HISTORY_LIMIT {
            let excess = self.history.len() - CURRICULUM_HISTORY_LIMIT;
            self.history.drain(..excess);
        }
        self.last = Some(entry);
    }
}

/// Runs [`select_next_holdout`] and persists the decision.
pub struct CurriculumSelector<'a> {
    store: &'a dyn StateStore,
    thresholds: CurriculumThresholds,
}

impl<'a> CurriculumSelector<'a> {
    pub fn new(store: &'a dyn StateStore, thresholds: CurriculumThresholds) -> Self {
        Self { store, thresholds }
    }

    pub fn state(&self) -> Result<CurriculumState> {
        Ok(load_typed(self.store, CURRICULUM_STATE_KEY)?.unwrap_or_default())
    }

    /// Select and record. `current_holdout` defaults to the last persisted
    /// decision's target when `None`.
    pub fn select(
        &self,
        report: &HoldoutReport,
        current_holdout: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(CurriculumDecision, ContentDigest)> {
        let mut state = self.state()?;
        let current = current_holdout
            .map(str::to_string)
            .or_else(|| state.last.as_ref().map(|e| e.decision.next_holdout.clone()))
            .unwrap_or_default();

        let decision = select_next_holdout(report, &self.thresholds, &current);
        if decision.next_holdout.is_empty() {
            return Err(RelgateError::InvalidInput(
                "holdout report has no main holdout and no current holdout is known".to_string(),
            ));
        }
        obs::emit_curriculum_selected(
            &decision.used_holdout,
            &decision.next_holdout,
            decision.reason.as_str(),
            decision.exhausted,
        );

        state.record(CurriculumEntry {
            decided_at: now,
            thresholds: self.thresholds,
            decision: decision.clone(),
        });
        let digest = save_typed(self.store, CURRICULUM_STATE_KEY, &state)?;
        debug!(digest = %digest.short(), history = state.history.len(), "curriculum state saved");
        Ok((decision, digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relgate_state::MemoryStateStore;

    fn variant(gap: f64, greedy: f64, policy: f64) -> VariantMetrics {
        VariantMetrics {
            sa_beats_greedy_rate: Some(gap),
            greedy_task_pass_rate_min: Some(greedy),
            policy_task_pass_rate_min: Some(policy),
            excluded_from_distillation: false,
        }
    }

    fn solved_report() -> HoldoutReport {
        HoldoutReport {
            holdout: Some(HoldoutMetrics {
                name: Some("main".to_string()),
                sa_beats_greedy_rate: Some(0.0),
                policy_task_pass_rate_min: Some(1.0),
                greedy_task_pass_rate_min: Some(1.0),
            }),
            variant_breakdown: BTreeMap::new(),
        }
    }

    #[test]
    fn unsolved_main_is_kept() {
        let mut report = solved_report();
        report.holdout.as_mut().unwrap().greedy_task_pass_rate_min = Some(0.5);
        let d = select_next_holdout(&report, &CurriculumThresholds::default(), "x");
        assert_eq!(d.reason, CurriculumReason::HoldoutUnsolved);
        assert_eq!(d.next_holdout, "main");
    }

    #[test]
    fn wide_gap_on_main_is_kept() {
        let mut report = solved_report();
        report.holdout.as_mut().unwrap().sa_beats_greedy_rate = Some(0.3);
        let d = select_next_holdout(&report, &CurriculumThresholds::default(), "x");
        assert_eq!(d.reason, CurriculumReason::HoldoutUnsolved);
    }

    #[test]
    fn largest_gap_variant_wins_with_tie_breaks() {
        let mut report = solved_report();
        report.variant_breakdown.insert("a".into(), variant(0.4, 0.5, 0.9));
        report.variant_breakdown.insert("b".into(), variant(0.4, 0.3, 0.9));
        report.variant_breakdown.insert("c".into(), variant(0.4, 0.3, 0.8));
        report.variant_breakdown.insert("d".into(), variant(0.05, 0.0, 0.0));
        let mut excluded = variant(0.9, 0.0, 0.0);
        excluded.excluded_from_distillation = true;
        report.variant_breakdown.insert("e".into(), excluded);

        let d = select_next_holdout(&report, &CurriculumThresholds::default(), "x");
        assert_eq!(d.reason, CurriculumReason::GapCandidate);
        assert_eq!(d.next_holdout, "c");
        assert_eq!(d.used_holdout, "main");
        assert!(!d.exhausted);
    }

    #[test]
    fn no_candidate_means_exhausted() {
        let mut report = solved_report();
        report.variant_breakdown.insert("low".into(), variant(0.01, 0.0, 0.0));
        let d = select_next_holdout(&report, &CurriculumThresholds::default(), "x");
        assert_eq!(d.reason, CurriculumReason::CurriculumExhausted);
        assert!(d.exhausted);
        assert_eq!(d.next_holdout, "main");
    }

    #[test]
    fn missing_holdout_falls_back_to_current() {
        let d = select_next_holdout(
            &HoldoutReport::default(),
            &CurriculumThresholds::default(),
            "current",
        );
        assert_eq!(d.reason, CurriculumReason::Fallback);
        assert_eq!(d.next_holdout, "current");
    }

    #[test]
    fn selection_is_idempotent() {
        let mut report = solved_report();
        report.variant_breakdown.insert("a".into(), variant(0.2, 0.1, 0.1));
        let t = CurriculumThresholds::default();
        let first = select_next_holdout(&report, &t, "x");
        for _ in 0..5 {
            assert_eq!(select_next_holdout(&report, &t, "x"), first);
        }
    }

    #[test]
    fn selector_persists_bounded_history() {
        let store = MemoryStateStore::new();
        let selector = CurriculumSelector::new(&store, CurriculumThresholds::default());
        let report = solved_report();
        for _ in 0..(CURRICULUM_HISTORY_LIMIT + 5) {
            selector.select(&report, Some("main"), Utc::now()).unwrap();
        }
        let state = selector.state().unwrap();
        assert_eq!(state.history.len(), CURRICULUM_HISTORY_LIMIT);
        assert_eq!(
            state.last.unwrap().decision.reason,
            CurriculumReason::CurriculumExhausted
        );
    }

    #[test]
    fn selector_defaults_current_to_last_target() {
        let store = MemoryStateStore::new();
        let selector = CurriculumSelector::new(&store, CurriculumThresholds::default());
        selector
            .select(&HoldoutReport::default(), Some("h1"), Utc::now())
            .unwrap();
        let (d, _) = selector
            .select(&HoldoutReport::default(), None, Utc::now())
            .unwrap();
        assert_eq!(d.next_holdout, "h1");
    }

    #[test]
    fn selector_refuses_to_record_an_empty_target() {
        let store = MemoryStateStore::new();
        let selector = CurriculumSelector::new(&store, CurriculumThresholds::default());
        let err = selector
            .select(&HoldoutReport::default(), None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, RelgateError::InvalidInput(_)));
        assert_eq!(selector.state().unwrap(), CurriculumState::default());
    }
}
