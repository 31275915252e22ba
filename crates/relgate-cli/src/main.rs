//! relgate - reliability gate controller CLI
//!
//! ## Commands
//!
//! - `contract validate`: schema + semantic validation of a release contract
//! - `matrix build`: run family producers and aggregate the reliability matrix
//! - `gate family`: canary / persona hard gate over one family's splits
//! - `curriculum select`: pick the next holdout from a holdout report
//! - `rotation next`: round-robin holdout selection
//! - `pareto rank`: Pareto-rank mitigation policies
//! - `watchdog run`: supervise a command with stall detection and retries
//! - `latest resolve`: find the newest matching artifact
//! - `release-check`: validate, build matrix, persist, select next holdout
//!
//! Gating commands exit `0` on PASS and `1` otherwise.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};

use relgate_core::{
    build_matrix, evaluate_family_gate, load_gate_inputs, rank_policies, render_matrix_md,
    render_pareto_md, write_family_summary, write_matrix_artifact, write_matrix_md,
    ArtifactStore, CanaryPolicy, ContractValidator, CurriculumSelector, CurriculumThresholds,
    GateOptions, HoldoutReport, HoldoutRotation, MatrixOptions, MatrixResult, PolicyRow, Stage,
    ValidatedContract,
};
use relgate_runner::{
    run_release_check, CommandLine, CommandProducer, HttpDependency, ProducerConfig,
    ReleaseCheckConfig, Watchdog, WatchdogPolicy, PRODUCER_LOCK_FILE,
};
use relgate_state::{open_state_store_from_env, FsStateStore, StateConfig, StateStore};

#[derive(Parser)]
#[command(name = "relgate")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Reliability gate controller for LLM evaluation releases", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Directory holding rotation and curriculum state
    #[arg(long, global = true, env = "RELGATE_STATE_DIR")]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Release contract operations
    Contract {
        #[command(subcommand)]
        action: ContractAction,
    },

    /// Reliability matrix operations
    Matrix {
        #[command(subcommand)]
        action: MatrixAction,
    },

    /// Canary / persona hard gate
    Gate {
        #[command(subcommand)]
        action: GateAction,
    },

    /// Autocurriculum holdout selection
    Curriculum {
        #[command(subcommand)]
        action: CurriculumAction,
    },

    /// Round-robin holdout rotation
    Rotation {
        #[command(subcommand)]
        action: RotationAction,
    },

    /// Policy Pareto ranking
    Pareto {
        #[command(subcommand)]
        action: ParetoAction,
    },

    /// Attempt watchdog
    Watchdog {
        #[command(subcommand)]
        action: WatchdogAction,
    },

    /// Latest-artifact pointers
    Latest {
        #[command(subcommand)]
        action: LatestAction,
    },

    /// Validate contract, build and persist the matrix, pick the next holdout
    ReleaseCheck(ReleaseCheckArgs),
}

#[derive(Subcommand)]
enum ContractAction {
    /// Validate a contract and list its families
    Validate(ContractArgs),
}

#[derive(Subcommand)]
enum MatrixAction {
    /// Build the reliability matrix
    Build(MatrixArgs),
}

#[derive(Subcommand)]
enum GateAction {
    /// Evaluate one family's splits and write its combined summary
    Family {
        #[arg(long)]
        family: String,

        /// observe | ramp | target | custom
        #[arg(long, default_value = "observe")]
        stage: Stage,

        /// Directory with anchors/holdout/canary/persona JSON files
        #[arg(long)]
        splits: PathBuf,

        /// Combined summary output path
        #[arg(short, long)]
        out: PathBuf,

        #[arg(long, default_value_t = relgate_core::DEFAULT_CANARY_ALERT_THRESHOLD)]
        canary_threshold: f64,

        /// Enforce canary alerts regardless of stage
        #[arg(long)]
        strict_canary: bool,

        /// Do not fail when the persona check is absent
        #[arg(long)]
        allow_missing_persona: bool,
    },
}

#[derive(Subcommand)]
enum CurriculumAction {
    /// Select the next holdout from a holdout report and record the decision
    Select {
        #[arg(long)]
        report: PathBuf,

        /// Holdout currently in use (defaults to the last decision)
        #[arg(long)]
        current: Option<String>,

        #[command(flatten)]
        thresholds: ThresholdArgs,
    },

    /// Print the persisted curriculum state
    Show,
}

#[derive(Subcommand)]
enum RotationAction {
    /// Select the next holdout and advance the index
    Next {
        /// Comma-separated holdout ids; empty rotates the stored list
        #[arg(long, value_delimiter = ',', env = "RELGATE_ROTATION")]
        list: Vec<String>,

        /// Returned when no list is configured
        #[arg(long, default_value = "")]
        default: String,
    },

    /// Print the persisted rotation state
    Show,
}

#[derive(Subcommand)]
enum ParetoAction {
    /// Rank policy rows (JSON array of {policy, prompt_mode, guard_mode, metrics...})
    Rank {
        #[arg(long)]
        rows: PathBuf,

        /// Policy used for deltas
        #[arg(long)]
        baseline: Option<String>,

        /// Write the ranking JSON here
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Write the markdown table here instead of stdout
        #[arg(long)]
        md: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum WatchdogAction {
    /// Supervise a command: `relgate watchdog run -- <cmd> [args...]`
    Run {
        #[arg(long, env = "RELGATE_MAX_ATTEMPTS", default_value_t = 3)]
        max_attempts: u32,

        #[arg(long, env = "RELGATE_MAX_CYCLES", default_value_t = 1)]
        max_cycles: u32,

        #[arg(long, env = "RELGATE_STALL_MINUTES", default_value_t = 20.0)]
        stall_minutes: f64,

        #[arg(long, env = "RELGATE_POLL_SECS", default_value_t = 30.0)]
        poll_secs: f64,

        /// Hard wall-clock limit per attempt
        #[arg(long, env = "RELGATE_ATTEMPT_TIMEOUT_MINUTES")]
        attempt_timeout_minutes: Option<f64>,

        #[arg(long, env = "RELGATE_WATCHDOG_LOG_DIR", default_value = ".relgate/watchdog")]
        log_dir: PathBuf,

        /// Readiness URL of the inference server
        #[arg(long, env = "RELGATE_HEALTH_URL")]
        health_url: Option<String>,

        /// Command restarting the inference server
        #[arg(long, env = "RELGATE_RESTART_CMD")]
        restart_cmd: Option<String>,

        #[arg(long, env = "RELGATE_READY_TIMEOUT_SECS", default_value_t = 300)]
        ready_timeout_secs: u64,

        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
}

#[derive(Subcommand)]
enum LatestAction {
    /// Print the most recently modified matching file
    Resolve {
        #[arg(long)]
        dir: PathBuf,

        #[arg(long, default_value = "")]
        prefix: String,

        #[arg(long, default_value = ".json")]
        suffix: String,

        /// Also record the result in this pointer file
        #[arg(long)]
        pointer: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ContractArgs {
    #[arg(short, long, env = "RELGATE_CONTRACT")]
    contract: PathBuf,

    /// JSON schema overriding the embedded one
    #[arg(long, env = "RELGATE_CONTRACT_SCHEMA")]
    schema: Option<PathBuf>,
}

impl ContractArgs {
    fn load(&self) -> Result<ValidatedContract> {
        let validator = match &self.schema {
            Some(path) => ContractValidator::from_schema_path(path)
                .with_context(|| format!("Failed to load schema {:?}", path))?,
            None => ContractValidator::embedded()?,
        };
        validator
            .load(&self.contract)
            .with_context(|| format!("Invalid contract {:?}", self.contract))
    }
}

#[derive(Args)]
struct ThresholdArgs {
    #[arg(long, env = "RELGATE_GAP_MIN", default_value_t = 0.10)]
    gap_min: f64,

    #[arg(long, env = "RELGATE_SOLVED_MIN", default_value_t = 1.0)]
    solved_min: f64,
}

impl ThresholdArgs {
    fn thresholds(&self) -> CurriculumThresholds {
        CurriculumThresholds {
            gap_min: self.gap_min,
            solved_min: self.solved_min,
        }
    }
}

#[derive(Args)]
struct ProducerArgs {
    #[arg(long, env = "RELGATE_TRIPLET_RUNNER", default_value = "")]
    triplet_runner: String,

    #[arg(long, env = "RELGATE_COMPRESSION_GENERATOR", default_value = "")]
    compression_generator: String,

    #[arg(long, env = "RELGATE_COMPRESSION_CHECKER", default_value = "")]
    compression_checker: String,

    #[arg(long, env = "RELGATE_ADAPTER", default_value = "base")]
    adapter: String,

    #[arg(long, env = "RELGATE_STEP_TIMEOUT_SECS", default_value_t = 14_400)]
    step_timeout_secs: u64,

    /// Directory for producer step logs
    #[arg(long, env = "RELGATE_PRODUCER_LOG_DIR")]
    producer_log_dir: Option<PathBuf>,

    /// Enforce canary alerts regardless of stage
    #[arg(long)]
    strict_canary: bool,

    /// Do not fail families whose persona check is absent
    #[arg(long)]
    allow_missing_persona: bool,

    /// Skip the single-producer lock
    #[arg(long)]
    no_producer_lock: bool,
}

impl ProducerArgs {
    fn config(&self, contract: &ValidatedContract, state_dir: &Path) -> ProducerConfig {
        ProducerConfig {
            triplet_runner: CommandLine::parse(&self.triplet_runner),
            compression_generator: CommandLine::parse(&self.compression_generator),
            compression_checker: CommandLine::parse(&self.compression_checker),
            adapter: self.adapter.clone(),
            step_timeout: Duration::from_secs(self.step_timeout_secs),
            lock_path: (!self.no_producer_lock).then(|| state_dir.join(PRODUCER_LOCK_FILE)),
            log_dir: self.producer_log_dir.clone(),
            default_canary_policy: contract.contract().default_canary_policy,
            strict_canary: self.strict_canary,
            require_persona: !self.allow_missing_persona,
        }
    }
}

#[derive(Args)]
struct MatrixArgs {
    #[command(flatten)]
    contract: ContractArgs,

    /// Root for relative artifact paths
    #[arg(long, env = "RELGATE_ARTIFACT_ROOT", default_value = ".")]
    artifact_root: PathBuf,

    /// Matrix JSON output (relative to the artifact root)
    #[arg(short, long, default_value = "reliability_matrix.json")]
    out: PathBuf,

    /// Markdown summary output
    #[arg(long)]
    md: Option<PathBuf>,

    /// Aggregate existing artifacts without running producers
    #[arg(long)]
    reuse_existing: bool,

    /// Record producer failures instead of aborting
    #[arg(long)]
    continue_on_run_failure: bool,

    #[arg(long)]
    run_id: Option<String>,

    #[command(flatten)]
    producer: ProducerArgs,
}

impl MatrixArgs {
    fn options(&self) -> MatrixOptions {
        let mut options = MatrixOptions {
            reuse_existing: self.reuse_existing,
            continue_on_run_failure: self.continue_on_run_failure,
            ..MatrixOptions::default()
        };
        if let Some(run_id) = &self.run_id {
            options.run_id = run_id.clone();
        }
        options
    }
}

#[derive(Args)]
struct ReleaseCheckArgs {
    #[command(flatten)]
    matrix: MatrixArgs,

    /// Comma-separated holdout rotation list
    #[arg(long, value_delimiter = ',', env = "RELGATE_ROTATION")]
    rotation: Vec<String>,

    /// Holdout report for curriculum selection
    #[arg(long)]
    holdout_report: Option<PathBuf>,

    #[arg(long)]
    current_holdout: Option<String>,

    #[command(flatten)]
    thresholds: ThresholdArgs,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    relgate_core::init_tracing(cli.json, level);

    let state_dir = cli.state_dir.clone();
    let code = match cli.command {
        Commands::Contract { action } => match action {
            ContractAction::Validate(args) => cmd_contract_validate(&args),
        },
        Commands::Matrix { action } => match action {
            MatrixAction::Build(args) => cmd_matrix_build(&args, state_dir.as_deref()).await,
        },
        Commands::Gate { action } => match action {
            GateAction::Family {
                family,
                stage,
                splits,
                out,
                canary_threshold,
                strict_canary,
                allow_missing_persona,
            } => {
                let options = GateOptions {
                    canary_policy: if strict_canary {
                        CanaryPolicy::Strict
                    } else {
                        CanaryPolicy::Triage
                    },
                    canary_alert_threshold: canary_threshold,
                    force_strict_canary: strict_canary,
                    require_persona: !allow_missing_persona,
                };
                cmd_gate_family(&family, stage, &splits, &out, &options)
            }
        },
        Commands::Curriculum { action } => {
            let store = open_state(state_dir.as_deref())?;
            match action {
                CurriculumAction::Select {
                    report,
                    current,
                    thresholds,
                } => cmd_curriculum_select(
                    store.as_ref(),
                    &report,
                    current.as_deref(),
                    thresholds.thresholds(),
                ),
                CurriculumAction::Show => {
                    let state = CurriculumSelector::new(store.as_ref(), CurriculumThresholds::default())
                        .state()?;
                    print_json(&state)?;
                    Ok(0)
                }
            }
        }
        Commands::Rotation { action } => {
            let store = open_state(state_dir.as_deref())?;
            let rotation = HoldoutRotation::new(store.as_ref());
            match action {
                RotationAction::Next { list, default } => {
                    let list: Vec<String> = list.into_iter().filter(|s| !s.is_empty()).collect();
                    let pick = rotation.next(&list, &default)?;
                    info!(index = pick.index, next_index = pick.next_index, "rotation advanced");
                    println!("{}", pick.holdout);
                    Ok(0)
                }
                RotationAction::Show => {
                    print_json(&rotation.state()?)?;
                    Ok(0)
                }
            }
        }
        Commands::Pareto { action } => match action {
            ParetoAction::Rank {
                rows,
                baseline,
                out,
                md,
            } => cmd_pareto_rank(&rows, baseline.as_deref(), out.as_deref(), md.as_deref()),
        },
        Commands::Watchdog { action } => match action {
            WatchdogAction::Run {
                max_attempts,
                max_cycles,
                stall_minutes,
                poll_secs,
                attempt_timeout_minutes,
                log_dir,
                health_url,
                restart_cmd,
                ready_timeout_secs,
                command,
            } => {
                let policy = WatchdogPolicy {
                    max_cycles,
                    max_attempts,
                    poll_interval: Duration::from_secs_f64(poll_secs.max(0.01)),
                    stall_timeout: Duration::from_secs_f64(stall_minutes.max(0.0) * 60.0),
                    attempt_timeout: attempt_timeout_minutes
                        .map(|m| Duration::from_secs_f64(m.max(0.0) * 60.0)),
                    ready_timeout: Duration::from_secs(ready_timeout_secs),
                };
                let mut watchdog = Watchdog::new(policy, CommandLine::new(command), &log_dir);
                if let Some(url) = health_url {
                    let mut dep = HttpDependency::new("inference-server", url);
                    if let Some(cmd) = restart_cmd {
                        dep = dep.with_restart_command(CommandLine::parse(&cmd));
                    }
                    watchdog = watchdog.with_dependency(dep);
                }
                cmd_watchdog_run(&watchdog).await
            }
        },
        Commands::Latest { action } => match action {
            LatestAction::Resolve {
                dir,
                prefix,
                suffix,
                pointer,
            } => cmd_latest_resolve(&dir, &prefix, &suffix, pointer.as_deref()),
        },
        Commands::ReleaseCheck(args) => cmd_release_check(&args, state_dir.as_deref()).await,
    }?;

    Ok(ExitCode::from(code.clamp(0, 255) as u8))
}

/// Resolve the state directory: explicit flag, else environment default.
fn state_dir_or_default(dir: Option<&Path>) -> PathBuf {
    dir.map(Path::to_path_buf)
        .unwrap_or_else(|| StateConfig::from_env().state_dir)
}

fn open_state(dir: Option<&Path>) -> Result<Arc<dyn StateStore>> {
    let store: Arc<dyn StateStore> = match dir {
        Some(dir) => Arc::new(
            FsStateStore::new(dir).with_context(|| format!("Failed to open state dir {:?}", dir))?,
        ),
        None => open_state_store_from_env().context("Failed to open state store")?,
    };
    Ok(store)
}

fn cmd_contract_validate(args: &ContractArgs) -> Result<i32> {
    let contract = args.load()?;
    let c = contract.contract();
    println!(
        "contract {} v{} ({}) - {} families, digest {}",
        c.contract_id,
        c.version,
        serde_json::to_value(c.freshness_policy)?
            .as_str()
            .unwrap_or_default(),
        c.required_families.len(),
        contract.digest().short()
    );
    if let Some(source) = contract.source() {
        println!("  source: {}", source.display());
    }
    for family in contract.families() {
        println!(
            "  {:<24} stage={:<8} artifact={}",
            family.id,
            family.stage,
            family.artifact_path.display()
        );
    }
    Ok(0)
}

async fn cmd_matrix_build(args: &MatrixArgs, state_dir: Option<&Path>) -> Result<i32> {
    let contract = args.contract.load()?;
    let state_dir = state_dir_or_default(state_dir);
    let producer = CommandProducer::new(
        args.producer.config(&contract, &state_dir),
        ArtifactStore::new(&args.artifact_root),
    );
    let store = ArtifactStore::new(&args.artifact_root);

    let result = build_matrix(&contract, &producer, &store, &args.options(), Utc::now())
        .await
        .context("Matrix build aborted")?;
    let digest = write_matrix_artifact(&store, &args.out, &result)
        .with_context(|| format!("Failed to write matrix {:?}", args.out))?;
    if let Some(md) = &args.md {
        write_matrix_md(md, &result).with_context(|| format!("Failed to write {:?}", md))?;
    }
    print_matrix_summary(&result);
    println!(
        "written: {} (sha256 {})",
        store.resolve_path(&args.out).display(),
        digest.short()
    );
    relgate_core::METRICS.flush();
    Ok(result.exit_code())
}

fn cmd_gate_family(
    family: &str,
    stage: Stage,
    splits: &Path,
    out: &Path,
    options: &GateOptions,
) -> Result<i32> {
    let store = ArtifactStore::new(".");
    let inputs = load_gate_inputs(&store, family, stage, splits, None);
    let report = evaluate_family_gate(&inputs, options);
    write_family_summary(&store, out, splits, &report, Utc::now())
        .with_context(|| format!("Failed to write {:?}", out))?;
    print_json(&report)?;
    Ok(if report.passed() { 0 } else { 1 })
}

fn cmd_curriculum_select(
    store: &dyn StateStore,
    report_path: &Path,
    current: Option<&str>,
    thresholds: CurriculumThresholds,
) -> Result<i32> {
    let report: HoldoutReport = read_json_file(report_path)?;
    let (decision, digest) = CurriculumSelector::new(store, thresholds)
        .select(&report, current, Utc::now())
        .context("Curriculum selection failed")?;
    info!(digest = %digest.short(), "curriculum state persisted");
    print_json(&decision)?;
    Ok(0)
}

fn cmd_pareto_rank(
    rows_path: &Path,
    baseline: Option<&str>,
    out: Option<&Path>,
    md: Option<&Path>,
) -> Result<i32> {
    let rows: Vec<PolicyRow> = read_json_file(rows_path)?;
    let report = rank_policies(&rows, baseline)?;
    if let Some(out) = out {
        ArtifactStore::new(".")
            .write_json_with_digest(out, &report)
            .with_context(|| format!("Failed to write {:?}", out))?;
    }
    let rendered = render_pareto_md(&report);
    match md {
        Some(path) => {
            std::fs::write(path, rendered).with_context(|| format!("Failed to write {:?}", path))?
        }
        None => print!("{}", rendered),
    }
    Ok(0)
}

async fn cmd_watchdog_run(watchdog: &Watchdog) -> Result<i32> {
    let summary = watchdog.run().await.context("Watchdog failed")?;
    for cycle in &summary.cycles {
        for a in &cycle.attempts {
            println!(
                "cycle {} attempt {}: {} (exit {}, {:.1}s)",
                a.cycle,
                a.attempt,
                a.status.as_str(),
                a.exit_code.map(|c| c.to_string()).unwrap_or_else(|| "-".into()),
                a.elapsed_s
            );
        }
    }
    println!(
        "watchdog {}: summary in {}",
        if summary.passed { "PASS" } else { "FAIL" },
        watchdog.log_dir().display()
    );
    Ok(summary.exit_code())
}

fn cmd_latest_resolve(dir: &Path, prefix: &str, suffix: &str, pointer: Option<&Path>) -> Result<i32> {
    let store = ArtifactStore::new(".");
    match store.resolve_latest_matching(dir, prefix, suffix)? {
        Some(path) => {
            if let Some(pointer) = pointer {
                store.update_latest_pointer(pointer, &path)?;
            }
            println!("{}", path.display());
            Ok(0)
        }
        None => {
            eprintln!("no file matching {prefix}*{suffix} in {}", dir.display());
            Ok(1)
        }
    }
}

async fn cmd_release_check(args: &ReleaseCheckArgs, state_dir: Option<&Path>) -> Result<i32> {
    let contract = args.matrix.contract.load()?;
    let state_path = state_dir_or_default(state_dir);
    let state = open_state(Some(&state_path))?;
    let producer = CommandProducer::new(
        args.matrix.producer.config(&contract, &state_path),
        ArtifactStore::new(&args.matrix.artifact_root),
    );

    let config = ReleaseCheckConfig {
        contract_path: args.matrix.contract.contract.clone(),
        schema_path: args.matrix.contract.schema.clone(),
        artifact_root: args.matrix.artifact_root.clone(),
        output_path: args.matrix.out.clone(),
        markdown_path: args.matrix.md.clone(),
        matrix: args.matrix.options(),
        rotation_list: args.rotation.iter().filter(|s| !s.is_empty()).cloned().collect(),
        holdout_report: args.holdout_report.clone(),
        current_holdout: args.current_holdout.clone(),
        curriculum: args.thresholds.thresholds(),
    };

    let outcome = run_release_check(&config, &producer, state.as_ref())
        .await
        .context("Release check aborted")?;
    print_matrix_summary(&outcome.matrix);
    println!(
        "written: {} (sha256 {})",
        outcome.matrix_path.display(),
        outcome.digest.short()
    );
    if let Some(next) = &outcome.next_holdout {
        println!(
            "next holdout: {} ({}{})",
            next.holdout,
            serde_json::to_value(next.source)?.as_str().unwrap_or_default(),
            next.reason
                .as_deref()
                .map(|r| format!(", {r}"))
                .unwrap_or_default()
        );
    }
    Ok(outcome.exit_code())
}

fn print_matrix_summary(result: &MatrixResult) {
    if tracing::enabled!(Level::DEBUG) {
        println!("{}", render_matrix_md(result));
    }
    println!(
        "matrix {} | coverage {}/{} ({:.2}) | failing {} | freshness violations {}",
        result.status.as_str(),
        result.coverage.produced_total,
        result.coverage.required_total,
        result.coverage.coverage_rate,
        result.failing_families.len(),
        result.freshness_violations.len()
    );
    for failure in &result.failures {
        println!("  - {}", failure);
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read JSON file: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn watchdog_command_follows_separator() {
        let cli = Cli::try_parse_from([
            "relgate", "watchdog", "run", "--max-attempts", "2", "--", "sh", "-c", "exit 0",
        ])
        .expect("parse");
        match cli.command {
            Commands::Watchdog {
                action: WatchdogAction::Run {
                    max_attempts,
                    command,
                    ..
                },
            } => {
                assert_eq!(max_attempts, 2);
                assert_eq!(command, vec!["sh", "-c", "exit 0"]);
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn rotation_list_is_comma_separated() {
        let cli = Cli::try_parse_from(["relgate", "rotation", "next", "--list", "a,b,c"])
            .expect("parse");
        match cli.command {
            Commands::Rotation {
                action: RotationAction::Next { list, .. },
            } => assert_eq!(list, vec!["a", "b", "c"]),
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn gate_stage_parses() {
        let cli = Cli::try_parse_from([
            "relgate", "gate", "family", "--family", "f", "--stage", "target", "--splits", "s",
            "--out", "o.json",
        ])
        .expect("parse");
        assert!(matches!(
            cli.command,
            Commands::Gate {
                action: GateAction::Family {
                    stage: Stage::Target,
                    ..
                }
            }
        ));
    }

    #[test]
    fn pareto_rank_writes_outputs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let rows = dir.path().join("rows.json");
        std::fs::write(
            &rows,
            json!([
                {"policy": "a", "prompt_mode": "p", "guard_mode": "g", "goal_drift_rate": 0.1,
                 "instruction_violation_rate": 0.1, "capitulation_rate": 0.1, "responsiveness_rate": 0.9},
                {"policy": "b", "prompt_mode": "p", "guard_mode": "g", "goal_drift_rate": 0.2,
                 "instruction_violation_rate": 0.2, "capitulation_rate": 0.2, "responsiveness_rate": 0.8}
            ])
            .to_string(),
        )
        .expect("write rows");
        let out = dir.path().join("ranking.json");
        let md = dir.path().join("ranking.md");

        let code = cmd_pareto_rank(&rows, Some("a"), Some(&out), Some(&md)).expect("rank");
        assert_eq!(code, 0);
        assert!(out.exists());
        assert!(std::fs::read_to_string(&md).expect("md").contains("| b |"));
    }

    #[test]
    fn curriculum_select_persists_decision() {
        let dir = tempfile::tempdir().expect("tempdir");
        let report = dir.path().join("report.json");
        std::fs::write(&report, json!({"holdout": {"name": "main"}}).to_string()).expect("write");
        let store = FsStateStore::new(dir.path().join("state")).expect("store");

        let code =
            cmd_curriculum_select(&store, &report, None, CurriculumThresholds::default()).expect("select");
        assert_eq!(code, 0);
        assert!(dir.path().join("state/curriculum.json").exists());
    }
}
