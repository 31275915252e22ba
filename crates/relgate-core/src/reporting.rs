use std::path::Path;

use relgate_state::ContentDigest;

use crate::artifact_store::ArtifactStore;
use crate::domain::{MatrixResult, Result};
use crate::pareto::ParetoReport;

/// Pointer file name written next to matrix artifacts.
pub const LATEST_MATRIX_POINTER: &str = "latest_matrix.txt";

/// Persist a matrix result with its `.digest` sibling and point
/// `latest_matrix.txt` (in the same directory) at it.
pub fn write_matrix_artifact(
    store: &ArtifactStore,
    path: &Path,
    result: &MatrixResult,
) -> Result<ContentDigest> {
    let digest = store.write_json_with_digest(path, result)?;
    let resolved = store.resolve_path(path);
    let pointer = resolved
        .parent()
        .map(|dir| dir.join(LATEST_MATRIX_POINTER))
        .unwrap_or_else(|| Path::new(LATEST_MATRIX_POINTER).to_path_buf());
    store.update_latest_pointer(&pointer, &resolved)?;
    Ok(digest)
}

fn yes_no(v: bool) -> &'static str {
    if v {
        "yes"
    } else {
        "no"
    }
}

/// Render markdown summary for CI job output.
pub fn render_matrix_md(result: &MatrixResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Reliability Matrix: {}\n\n", result.status.as_str()));
    out.push_str(&format!(
        "- contract: `{}` v{}\n- run: `{}`\n- coverage: {}/{} ({:.2})\n- failing families: {}\n- freshness violations: {}\n\n",
        result.contract_id,
        result.contract_version,
        result.run_id,
        result.coverage.produced_total,
        result.coverage.required_total,
        result.coverage.coverage_rate,
        result.failing_families.len(),
        result.freshness_violations.len(),
    ));

    out.push_str("| family | stage | status | fresh | reason |\n");
    out.push_str("|---|---|---|---|---|\n");
    for row in &result.families {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            row.id,
            row.stage,
            row.status,
            yes_no(row.freshness_ok),
            row.first_failure_reason.as_deref().unwrap_or("-"),
        ));
    }

    if !result.failures.is_empty() {
        out.push_str("\n## Failures\n");
        for f in &result.failures {
            out.push_str(&format!("- {}\n", f));
        }
    }
    out
}

/// Write the markdown summary next to the JSON artifact.
pub fn write_matrix_md(path: &Path, result: &MatrixResult) -> Result<()> {
    std::fs::write(path, render_matrix_md(result))?;
    Ok(())
}

/// Render one table per (prompt_mode, guard_mode) group.
pub fn render_pareto_md(report: &ParetoReport) -> String {
    let mut out = String::new();
    out.push_str("# Policy Pareto Ranking\n");
    if let Some(base) = &report.baseline_policy {
        out.push_str(&format!("\nbaseline: `{}`\n", base));
    }

    let mut current: Option<(&str, &str)> = None;
    for row in &report.rows {
        let group = (row.prompt_mode.as_str(), row.guard_mode.as_str());
        if current != Some(group) {
            current = Some(group);
            out.push_str(&format!("\n## prompt={} guard={}\n\n", group.0, group.1));
            out.push_str("| policy | drift | violation | capitulation | responsiveness | frontier | dominated by |\n");
            out.push_str("|---|---|---|---|---|---|---|\n");
        }
        let m = &row.metrics;
        out.push_str(&format!(
            "| {} | {:.3} | {:.3} | {:.3} | {:.3} | {} | {} |\n",
            row.policy,
            m.goal_drift_rate,
            m.instruction_violation_rate,
            m.capitulation_rate,
            m.responsiveness_rate,
            yes_no(row.pareto_frontier),
            if row.dominated_by.is_empty() {
                "-".to_string()
            } else {
                row.dominated_by.join(", ")
            },
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Coverage, FreshnessPolicy, MatrixStatus};
    use crate::pareto::{rank_policies, PolicyMetrics, PolicyRow};
    use chrono::{DateTime, Utc};

    fn empty_result() -> MatrixResult {
        let at = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .expect("parse RFC3339")
            .with_timezone(&Utc);
        MatrixResult {
            run_id: "r1".to_string(),
            contract_id: "release".to_string(),
            contract_version: "1".to_string(),
            freshness_policy: FreshnessPolicy::AllowLatest,
            matrix_started_at: at,
            generated_at: at,
            coverage: Coverage {
                required_total: 1,
                produced_total: 0,
                coverage_rate: 0.0,
                missing_families: vec!["compression".to_string()],
            },
            families: vec![],
            failing_families: vec![],
            freshness_violations: vec![],
            status: MatrixStatus::Fail,
            failures: vec!["compression: artifact_missing".to_string()],
        }
    }

    #[test]
    fn matrix_markdown_render_is_stable() {
        let actual = render_matrix_md(&empty_result());
        let expected = "# Reliability Matrix: FAIL\n\n- contract: `release` v1\n- run: `r1`\n- coverage: 0/1 (0.00)\n- failing families: 0\n- freshness violations: 0\n\n| family | stage | status | fresh | reason |\n|---|---|---|---|---|\n\n## Failures\n- compression: artifact_missing\n";
        assert_eq!(actual, expected);
    }

    #[test]
    fn matrix_artifact_gets_digest_and_pointer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path());
        let result = empty_result();
        let digest = write_matrix_artifact(&store, Path::new("out/matrix.json"), &result)
            .expect("write matrix");

        let back: MatrixResult = store
            .read_json_verified(Path::new("out/matrix.json"))
            .expect("verified read");
        assert_eq!(back, result);
        assert_eq!(digest.as_str().len(), 64);

        let target = store
            .read_latest_pointer(Path::new("out/latest_matrix.txt"))
            .expect("pointer")
            .expect("pointer present");
        assert_eq!(target, dir.path().join("out/matrix.json"));
    }

    #[test]
    fn pareto_markdown_groups_rows() {
        let metrics = PolicyMetrics {
            goal_drift_rate: 0.1,
            instruction_violation_rate: 0.0,
            capitulation_rate: 0.0,
            responsiveness_rate: 1.0,
        };
        let rows = vec![
            PolicyRow {
                policy: "p".into(),
                prompt_mode: "plain".into(),
                guard_mode: "off".into(),
                metrics,
            },
            PolicyRow {
                policy: "q".into(),
                prompt_mode: "plain".into(),
                guard_mode: "on".into(),
                metrics,
            },
        ];
        let md = render_pareto_md(&rank_policies(&rows, None).expect("rank"));
        assert_eq!(md.matches("## prompt=plain").count(), 2);
        assert!(md.contains("| p | 0.100 | 0.000 | 0.000 | 1.000 | yes | - |"));
    }
}
