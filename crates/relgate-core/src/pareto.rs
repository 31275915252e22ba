//! Policy Pareto ranker over (policy, prompt_mode, guard_mode) result rows.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::{RelgateError, Result};
use crate::obs;

/// The four compared objectives. Rates are in `[0, 1]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PolicyMetrics {
    /// Minimize.
    pub goal_drift_rate: f64,
    /// Minimize.
    pub instruction_violation_rate: f64,
    /// Minimize.
    pub capitulation_rate: f64,
    /// Maximize.
    pub responsiveness_rate: f64,
}

impl PolicyMetrics {
    /// Each objective oriented so that smaller is better.
    fn costs(&self) -> [f64; 4] {
        [
            self.goal_drift_rate,
            self.instruction_violation_rate,
            self.capitulation_rate,
            -self.responsiveness_rate,
        ]
    }

    fn is_finite(&self) -> bool {
        self.costs().iter().all(|v| v.is_finite())
    }
}

/// Input row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyRow {
    pub policy: String,
    pub prompt_mode: String,
    pub guard_mode: String,
    #[serde(flatten)]
    pub metrics: PolicyMetrics,
}

impl PolicyRow {
    pub fn group(&self) -> (&str, &str) {
        (&self.prompt_mode, &self.guard_mode)
    }
}

/// Signed differences `row - baseline` per objective.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MetricDeltas {
    pub goal_drift_rate: f64,
    pub instruction_violation_rate: f64,
    pub capitulation_rate: f64,
    pub responsiveness_rate: f64,
}

impl MetricDeltas {
    fn between(row: &PolicyMetrics, baseline: &PolicyMetrics) -> Self {
        Self {
            goal_drift_rate: row.goal_drift_rate - baseline.goal_drift_rate,
            instruction_violation_rate: row.instruction_violation_rate
                - baseline.instruction_violation_rate,
            capitulation_rate: row.capitulation_rate - baseline.capitulation_rate,
            responsiveness_rate: row.responsiveness_rate - baseline.responsiveness_rate,
        }
    }
}

/// Ranked output row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComparisonRow {
    pub policy: String,
    pub prompt_mode: String,
    pub guard_mode: String,
    pub metrics: PolicyMetrics,
    pub pareto_frontier: bool,
    /// Policies in the same group that dominate this row.
    pub dominated_by: Vec<String>,
    /// `None` when the group has no baseline row.
    pub deltas_vs_baseline: Option<MetricDeltas>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParetoReport {
    pub baseline_policy: Option<String>,
    pub rows: Vec<ComparisonRow>,
}

impl ParetoReport {
    pub fn frontier(&self) -> impl Iterator<Item = &ComparisonRow> {
        self.rows.iter().filter(|r| r.pareto_frontier)
    }
}

/// `a` dominates `b`: no worse on every objective, strictly better on one.
pub fn dominates(a: &PolicyMetrics, b: &PolicyMetrics) -> bool {
    let (a, b) = (a.costs(), b.costs());
    a.iter().zip(b.iter()).all(|(x, y)| x <= y) && a.iter().zip(b.iter()).any(|(x, y)| x < y)
}

fn primary_order(a: &PolicyRow, b: &PolicyRow) -> Ordering {
    a.prompt_mode
        .cmp(&b.prompt_mode)
        .then_with(|| a.guard_mode.cmp(&b.guard_mode))
        .then_with(|| a.metrics.goal_drift_rate.total_cmp(&b.metrics.goal_drift_rate))
        .then_with(|| {
            a.metrics
                .instruction_violation_rate
                .total_cmp(&b.metrics.instruction_violation_rate)
        })
        .then_with(|| a.metrics.capitulation_rate.total_cmp(&b.metrics.capitulation_rate))
        .then_with(|| b.metrics.responsiveness_rate.total_cmp(&a.metrics.responsiveness_rate))
        .then_with(|| a.policy.cmp(&b.policy))
}

/// Sort rows, mark the per-group Pareto frontier and compute baseline deltas.
///
/// Rejects non-finite metrics; a NaN would make dominance meaningless.
pub fn rank_policies(rows: &[PolicyRow], baseline_policy: Option<&str>) -> Result<ParetoReport> {
    if let Some(bad) = rows.iter().find(|r| !r.metrics.is_finite()) {
        return Err(RelgateError::InvalidInput(format!(
            "non-finite metric for policy {} ({}/{})",
            bad.policy, bad.prompt_mode, bad.guard_mode
        )));
    }

    let mut sorted = rows.to_vec();
    sorted.sort_by(primary_order);

    let mut groups: BTreeMap<(&str, &str), Vec<&PolicyRow>> = BTreeMap::new();
    for row in &sorted {
        groups.entry(row.group()).or_default().push(row);
    }

    let mut out = Vec::with_capacity(sorted.len());
    for members in groups.values() {
        let baseline = baseline_policy
            .and_then(|name| members.iter().find(|r| r.policy == name))
            .map(|r| r.metrics);
        for row in members {
            let dominated_by: Vec<String> = members
                .iter()
                .filter(|other| dominates(&other.metrics, &row.metrics))
                .map(|other| other.policy.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            out.push(ComparisonRow {
                policy: row.policy.clone(),
                prompt_mode: row.prompt_mode.clone(),
                guard_mode: row.guard_mode.clone(),
                metrics: row.metrics,
                pareto_frontier: dominated_by.is_empty(),
                dominated_by,
                deltas_vs_baseline: baseline.map(|b| MetricDeltas::between(&row.metrics, &b)),
            });
        }
    }

    let frontier = out.iter().filter(|r| r.pareto_frontier).count();
    obs::emit_pareto_ranked(out.len(), groups.len(), frontier);
    Ok(ParetoReport {
        baseline_policy: baseline_policy.map(str::to_string),
        rows: out,
    })
}
