//! Top-level release-check flow: validate the contract, build and persist
//! the reliability matrix, then pick the next run's holdout.

use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use relgate_core::{
    build_matrix, write_matrix_artifact, write_matrix_md, ArtifactStore, ContractValidator,
    CurriculumSelector, CurriculumThresholds, FamilyProducer, HoldoutReport, HoldoutRotation,
    MatrixOptions, MatrixResult, Result, RunSpan, METRICS,
};
use relgate_state::{ContentDigest, StateStore};

#[derive(Debug, Clone)]
pub struct ReleaseCheckConfig {
    pub contract_path: PathBuf,
    /// Overrides the embedded contract schema.
    pub schema_path: Option<PathBuf>,
    pub artifact_root: PathBuf,
    /// Matrix JSON output; relative paths resolve against `artifact_root`.
    pub output_path: PathBuf,
    pub markdown_path: Option<PathBuf>,
    pub matrix: MatrixOptions,
    /// Non-empty selects the next holdout by rotation.
    pub rotation_list: Vec<String>,
    /// Selects the next holdout by curriculum when no rotation list is given.
    pub holdout_report: Option<PathBuf>,
    pub current_holdout: Option<String>,
    pub curriculum: CurriculumThresholds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldoutSource {
    Rotation,
    Curriculum,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextHoldout {
    pub holdout: String,
    pub source: HoldoutSource,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReleaseCheckOutcome {
    pub matrix: MatrixResult,
    pub matrix_path: PathBuf,
    pub digest: ContentDigest,
    pub next_holdout: Option<NextHoldout>,
}

impl ReleaseCheckOutcome {
    pub fn exit_code(&self) -> i32 {
        self.matrix.exit_code()
    }
}

pub async fn run_release_check(
    config: &ReleaseCheckConfig,
    producer: &dyn FamilyProducer,
    state: &dyn StateStore,
) -> Result<ReleaseCheckOutcome> {
    let _span = RunSpan::enter("release_check", &config.matrix.run_id);

    let validator = match &config.schema_path {
        Some(path) => ContractValidator::from_schema_path(path)?,
        None => ContractValidator::embedded()?,
    };
    let contract = validator.load(&config.contract_path)?;

    let store = ArtifactStore::new(&config.artifact_root);
    let matrix = build_matrix(&contract, producer, &store, &config.matrix, Utc::now()).await?;

    let matrix_path = store.resolve_path(&config.output_path);
    let digest = write_matrix_artifact(&store, &matrix_path, &matrix)?;
    if let Some(md) = &config.markdown_path {
        write_matrix_md(&store.resolve_path(md), &matrix)?;
    }
    info!(
        path = %matrix_path.display(),
        digest = %digest.short(),
        status = matrix.status.as_str(),
        "matrix written"
    );

    let next_holdout = select_next(config, state)?;
    METRICS.flush();
    Ok(ReleaseCheckOutcome {
        matrix,
        matrix_path,
        digest,
        next_holdout,
    })
}

fn select_next(config: &ReleaseCheckConfig, state: &dyn StateStore) -> Result<Option<NextHoldout>> {
    let current = config.current_holdout.clone().unwrap_or_default();
    if !config.rotation_list.is_empty() {
        let pick = HoldoutRotation::new(state).next(&config.rotation_list, &current)?;
        return Ok(Some(NextHoldout {
            holdout: pick.holdout,
            source: HoldoutSource::Rotation,
            reason: None,
        }));
    }
    if let Some(path) = &config.holdout_report {
        let report: HoldoutReport = ArtifactStore::new(&config.artifact_root).read_typed(path)?;
        let (decision, _) = CurriculumSelector::new(state, config.curriculum).select(
            &report,
            config.current_holdout.as_deref(),
            Utc::now(),
        )?;
        return Ok(Some(NextHoldout {
            holdout: decision.next_holdout,
            source: HoldoutSource::Curriculum,
            reason: Some(decision.reason.as_str().to_string()),
        }));
    }
    Ok(None)
}
