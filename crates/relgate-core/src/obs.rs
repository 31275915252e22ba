//! Structured observability hooks for controller lifecycle events.
//!
//! Events are emitted at `info!` level (filter with `RUST_LOG`); pass
//! `--json` to the CLI for JSON lines.

use tracing::{info, warn};

use crate::domain::FamilyRow;

/// RAII guard that enters a run-scoped tracing span.
///
/// ```ignore
/// let _span = RunSpan::enter("matrix", "3f2a...");
/// // every event below carries run_id = "3f2a..."
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(kind: &str, run_id: &str) -> Self {
        let span = tracing::info_span!("relgate.run", kind = %kind, run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_matrix_started(run_id: &str, contract_id: &str, families: usize) {
    info!(
        event = "matrix.started",
        run_id = %run_id,
        contract_id = %contract_id,
        families = families,
    );
}

pub fn emit_family_evaluated(run_id: &str, row: &FamilyRow) {
    info!(
        event = "matrix.family_evaluated",
        run_id = %run_id,
        family = %row.id,
        status = %row.status,
        freshness = %row.freshness_reason,
        producer_exit_code = ?row.producer_exit_code,
    );
}

pub fn emit_matrix_finished(
    run_id: &str,
    status: &str,
    coverage_rate: f64,
    failing: usize,
    freshness_violations: usize,
) {
    info!(
        event = "matrix.finished",
        run_id = %run_id,
        status = %status,
        coverage_rate = coverage_rate,
        failing = failing,
        freshness_violations = freshness_violations,
    );
}

pub fn emit_gate_evaluated(family: &str, status: &str, canary_status: &str, enforced: bool) {
    info!(
        event = "gate.family_evaluated",
        family = %family,
        status = %status,
        canary_status = %canary_status,
        canary_gate_enforced = enforced,
    );
}

pub fn emit_curriculum_selected(used: &str, next: &str, reason: &str, exhausted: bool) {
    info!(
        event = "curriculum.selected",
        used_holdout = %used,
        next_holdout = %next,
        reason = %reason,
        exhausted = exhausted,
    );
}

pub fn emit_rotation_selected(holdout: &str, index: usize, next_index: usize) {
    info!(
        event = "rotation.selected",
        holdout = %holdout,
        index = index,
        next_index = next_index,
    );
}

pub fn emit_pareto_ranked(rows: usize, groups: usize, frontier: usize) {
    info!(
        event = "pareto.ranked",
        rows = rows,
        groups = groups,
        frontier = frontier,
    );
}

pub fn emit_attempt_started(cycle: u32, attempt: u32, pid: Option<u32>) {
    info!(
        event = "watchdog.attempt_started",
        cycle = cycle,
        attempt = attempt,
        pid = ?pid,
    );
}

pub fn emit_attempt_finished(cycle: u32, attempt: u32, status: &str, exit_code: Option<i32>, elapsed_s: f64) {
    info!(
        event = "watchdog.attempt_finished",
        cycle = cycle,
        attempt = attempt,
        status = %status,
        exit_code = ?exit_code,
        elapsed_s = elapsed_s,
    );
}

pub fn emit_stalled(cycle: u32, attempt: u32, idle_s: f64) {
    warn!(event = "watchdog.stalled", cycle = cycle, attempt = attempt, idle_s = idle_s);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let _span = RunSpan::enter("matrix", "test-run-id");
    }
}
