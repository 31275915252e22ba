//! Command-backed family producer.
//!
//! Every family except `compression` runs one external "triplet" runner that
//! writes the anchors/holdout/canary/persona split artifacts; the canary and
//! persona gate then folds them into the family's summary artifact.
//! `compression` runs a generator followed by a separate reliability
//! checker, which writes the summary itself.
//!
//! Each step receives the fixed argument contract
//! `--family <id> --stage <stage> --adapter <adapter> --out <path>`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use relgate_core::{
    evaluate_family_gate, load_gate_inputs, write_family_summary, ArtifactStore, CanaryPolicy,
    FamilyProducer, GateOptions, ProducerOutcome, ProducerRequest, RelgateError, Result,
    DEFAULT_CANARY_ALERT_THRESHOLD,
};

use crate::command::{run_step, CommandLine};
use crate::guard::ProducerLock;

/// Family id that uses the two-step generator + checker invocation.
pub const COMPRESSION_FAMILY: &str = "compression";

#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub triplet_runner: CommandLine,
    pub compression_generator: CommandLine,
    pub compression_checker: CommandLine,
    pub adapter: String,
    /// Per-step limit; zero disables it.
    pub step_timeout: Duration,
    /// Single-producer lock; `None` disables the guard.
    pub lock_path: Option<PathBuf>,
    /// Directory for per-step logs; `None` discards producer output.
    pub log_dir: Option<PathBuf>,
    pub default_canary_policy: CanaryPolicy,
    /// Enforce canary alerts at every stage.
    pub strict_canary: bool,
    pub require_persona: bool,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            triplet_runner: CommandLine::default(),
            compression_generator: CommandLine::default(),
            compression_checker: CommandLine::default(),
            adapter: "base".to_string(),
            step_timeout: Duration::from_secs(4 * 60 * 60),
            lock_path: None,
            log_dir: None,
            default_canary_policy: CanaryPolicy::Triage,
            strict_canary: false,
            require_persona: true,
        }
    }
}

/// Split artifacts live next to the summary: `<dir>/<stem>_splits/`.
pub fn split_dir_for(artifact_path: &Path) -> PathBuf {
    let stem = artifact_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "artifact".to_string());
    artifact_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!("{stem}_splits"))
}

pub struct CommandProducer {
    config: ProducerConfig,
    store: ArtifactStore,
}

impl CommandProducer {
    pub fn new(config: ProducerConfig, store: ArtifactStore) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    fn args(&self, request: &ProducerRequest<'_>, out: &Path) -> Vec<String> {
        vec![
            "--family".to_string(),
            request.family.id.clone(),
            "--stage".to_string(),
            request.family.stage.to_string(),
            "--adapter".to_string(),
            self.config.adapter.clone(),
            "--out".to_string(),
            out.display().to_string(),
        ]
    }

    fn log_path(&self, family: &str, step: &str) -> Option<PathBuf> {
        self.config
            .log_dir
            .as_ref()
            .map(|dir| dir.join(format!("{family}.{step}.log")))
    }

    fn gate_options(&self, request: &ProducerRequest<'_>) -> GateOptions {
        let family = request.family;
        GateOptions {
            canary_policy: family.effective_canary_policy(self.config.default_canary_policy),
            canary_alert_threshold: family
                .canary_alert_threshold
                .unwrap_or(DEFAULT_CANARY_ALERT_THRESHOLD),
            force_strict_canary: self.config.strict_canary,
            require_persona: self.config.require_persona,
        }
    }

    async fn produce_compression(&self, request: &ProducerRequest<'_>) -> Result<ProducerOutcome> {
        let family = &request.family.id;
        let args = self.args(request, request.artifact_path);
        let mut steps = Vec::with_capacity(2);

        let generated = run_step(
            "generate",
            require(&self.config.compression_generator, "compression generator")?,
            &args,
            self.config.step_timeout,
            self.log_path(family, "generate").as_deref(),
        )
        .await?;
        let ok = generated.exit_code == 0;
        steps.push(generated);

        if ok {
            steps.push(
                run_step(
                    "check",
                    require(&self.config.compression_checker, "compression checker")?,
                    &args,
                    self.config.step_timeout,
                    self.log_path(family, "check").as_deref(),
                )
                .await?,
            );
        }
        Ok(ProducerOutcome::from_steps(steps))
    }

    async fn produce_triplet(&self, request: &ProducerRequest<'_>) -> Result<ProducerOutcome> {
        let family = &request.family.id;
        let split_dir = split_dir_for(request.artifact_path);
        let step = run_step(
            "triplet",
            require(&self.config.triplet_runner, "triplet runner")?,
            &self.args(request, &split_dir),
            self.config.step_timeout,
            self.log_path(family, "triplet").as_deref(),
        )
        .await?;

        // Gate post-processing problems land on the family row via the
        // summary artifact; they never change the runner's exit code.
        if step.exit_code == 0 {
            let inputs = load_gate_inputs(
                &self.store,
                family,
                request.family.stage,
                &split_dir,
                Some(request.matrix_started_at),
            );
            let report = evaluate_family_gate(&inputs, &self.gate_options(request));
            match write_family_summary(
                &self.store,
                request.artifact_path,
                &split_dir,
                &report,
                Utc::now(),
            ) {
                Ok(_) => info!(family = %family, status = %report.status, "family summary written"),
                Err(e) => warn!(family = %family, error = %e, "family summary not written"),
            }
        }
        Ok(ProducerOutcome::from_steps(vec![step]))
    }
}

fn require<'a>(command: &'a CommandLine, what: &str) -> Result<&'a CommandLine> {
    if command.is_empty() {
        Err(RelgateError::InvalidInput(format!("no {what} configured")))
    } else {
        Ok(command)
    }
}

#[async_trait]
impl FamilyProducer for CommandProducer {
    async fn produce(&self, request: &ProducerRequest<'_>) -> Result<ProducerOutcome> {
        let _lock = match &self.config.lock_path {
            Some(path) => Some(ProducerLock::acquire(path)?),
            None => None,
        };
        if request.family.id == COMPRESSION_FAMILY {
            self.produce_compression(request).await
        } else {
            self.produce_triplet(request).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_dir_sits_next_to_summary() {
        assert_eq!(
            split_dir_for(Path::new("/art/rpa/summary.json")),
            PathBuf::from("/art/rpa/summary_splits")
        );
    }
}
