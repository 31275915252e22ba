//! Gate evaluation from split files and persisted selection state on disk.

use std::path::Path;

use chrono::{Duration, Utc};
use serde_json::json;

use relgate_core::{
    evaluate_family_gate, load_gate_inputs, write_family_summary, ArtifactStore, CanaryStatus,
    CurriculumReason, CurriculumSelector, CurriculumThresholds, FailureCategory, GateOptions,
    HoldoutReport, HoldoutRotation, Stage,
};
use relgate_state::FsStateStore;

fn write(root: &Path, rel: &str, doc: serde_json::Value) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    std::fs::write(path, serde_json::to_vec(&doc).expect("serialize")).expect("write");
}

#[test]
fn gate_reads_splits_and_embeds_report_in_summary() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "fam/splits/anchors.json", json!({"status": "PASS"}));
    write(dir.path(), "fam/splits/holdout.json", json!({"overall": {"status": "pass"}}));
    write(dir.path(), "fam/splits/canary.json", json!({"exact_match_rate": 0.97, "status": "PASS"}));
    write(
        dir.path(),
        "fam/splits/persona.json",
        json!({"row_invariance_rate": 1.0, "rows_total": 24, "rows_changed": 0}),
    );
    let store = ArtifactStore::new(dir.path());

    let run_start = Utc::now() - Duration::minutes(1);
    let inputs = load_gate_inputs(&store, "fam", Stage::Target, Path::new("fam/splits"), Some(run_start));
    assert_eq!(inputs.holdout_status, "PASS");
    let report = evaluate_family_gate(&inputs, &GateOptions::default());
    assert_eq!(report.canary.canary_status, CanaryStatus::Warn);
    assert!(report.canary.canary_gate_enforced);
    assert!(report.hard_gate.passed);
    assert!(!report.passed());

    write_family_summary(
        &store,
        Path::new("fam/summary.json"),
        Path::new("fam/splits"),
        &report,
        Utc::now(),
    )
    .expect("summary");
    let record = store.read_record(Path::new("fam/summary.json"));
    assert_eq!(record.status, "FAIL");
    assert!(record.generated_at.is_some());

    let doc = store
        .read_json(Path::new("fam/summary.json"))
        .expect("read")
        .expect("present");
    assert_eq!(doc["hard_gate"]["failure_category"], json!("canary_alert"));
    assert_eq!(doc["hard_gate"]["persona"]["rows_total"], json!(24));
}

#[test]
fn missing_persona_file_is_contract_drift() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "s/anchors.json", json!({"status": "PASS"}));
    write(dir.path(), "s/holdout.json", json!({"status": "PASS"}));
    let store = ArtifactStore::new(dir.path());

    let inputs = load_gate_inputs(&store, "fam", Stage::Observe, Path::new("s"), None);
    let report = evaluate_family_gate(&inputs, &GateOptions::default());
    assert_eq!(report.canary.canary_status, CanaryStatus::Missing);
    assert!(report.canary.passed);
    assert_eq!(
        report.failure_category,
        Some(FailureCategory::PersonaContractDrift)
    );
}

#[test]
fn splits_older_than_the_run_do_not_pass() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stamped = (Utc::now() - Duration::days(2)).to_rfc3339();
    for name in ["anchors", "holdout"] {
        write(
            dir.path(),
            &format!("old/{name}.json"),
            json!({"status": "PASS", "generated_at_utc": stamped}),
        );
    }
    write(dir.path(), "old/canary.json", json!({"exact_match_rate": 0.01}));
    write(dir.path(), "old/persona.json", json!({"row_invariance_rate": 1.0}));
    let store = ArtifactStore::new(dir.path());

    let run_start = Utc::now() + Duration::seconds(2);
    let inputs = load_gate_inputs(&store, "fam", Stage::Observe, Path::new("old"), Some(run_start));
    assert_eq!(inputs.anchors_status, "STALE");
    assert_eq!(inputs.holdout_status, "STALE");
    assert!(inputs.canary.is_none());
    assert!(inputs.persona.is_none());

    let report = evaluate_family_gate(&inputs, &GateOptions::default());
    assert!(!report.passed());
    assert_eq!(
        report.failure_category,
        Some(FailureCategory::AnchorsOrHoldoutFailed)
    );

    write_family_summary(&store, Path::new("fam.json"), Path::new("old"), &report, Utc::now())
        .expect("summary");
    let doc = store.read_json(Path::new("fam.json")).expect("read").expect("present");
    assert_eq!(doc["splits"]["anchors"]["status"], json!("STALE"));
}

#[test]
fn malformed_canary_split_reads_as_missing() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "s/anchors.json", json!({"status": "PASS"}));
    write(dir.path(), "s/holdout.json", json!({"status": "PASS"}));
    std::fs::write(dir.path().join("s/canary.json"), "{oops").expect("write");
    write(dir.path(), "s/persona.json", json!({"row_invariance_rate": 1.0}));
    let store = ArtifactStore::new(dir.path());

    let inputs = load_gate_inputs(&store, "fam", Stage::Target, Path::new("s"), None);
    assert!(inputs.canary.is_none());
    let report = evaluate_family_gate(&inputs, &GateOptions::default());
    assert_eq!(report.canary.canary_status, CanaryStatus::Missing);
    assert_eq!(report.failure_category, Some(FailureCategory::CanaryMissing));
}

#[test]
fn rotation_survives_reopening_the_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let list: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();

    let first = {
        let store = FsStateStore::new(dir.path()).expect("store");
        HoldoutRotation::new(&store).next(&list, "main").expect("pick")
    };
    let store = FsStateStore::new(dir.path()).expect("store");
    let second = HoldoutRotation::new(&store).next(&list, "main").expect("pick");

    assert_eq!(first.holdout, "a");
    assert_eq!(second.holdout, "b");
    assert!(dir.path().join("holdout_rotation.json").exists());
}

#[test]
fn curriculum_state_is_persisted_to_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FsStateStore::new(dir.path()).expect("store");
    let report: HoldoutReport = serde_json::from_value(json!({
        "holdout": {
            "name": "main",
            "sa_beats_greedy_rate": 0.0,
            "policy_task_pass_rate_min": 1.0,
            "greedy_task_pass_rate_min": 1.0
        },
        "variant_breakdown": {
            "long_horizon": {"sa_beats_greedy_rate": 0.3, "greedy_task_pass_rate_min": 0.2, "policy_task_pass_rate_min": 0.9},
            "distilled": {"sa_beats_greedy_rate": 0.8, "excluded_from_distillation": true}
        }
    }))
    .expect("report");

    let selector = CurriculumSelector::new(&store, CurriculumThresholds::default());
    let (decision, _) = selector.select(&report, None, Utc::now()).expect("select");
    assert_eq!(decision.reason, CurriculumReason::GapCandidate);
    assert_eq!(decision.next_holdout, "long_horizon");

    let reopened = FsStateStore::new(dir.path()).expect("store");
    let state = CurriculumSelector::new(&reopened, CurriculumThresholds::default())
        .state()
        .expect("state");
    assert_eq!(state.history.len(), 1);
}
