//! Attempt watchdog.
//!
//! Runs a command as a supervised attempt, `launched -> running ->
//! {passed | failed | stalled}`, retrying up to `max_attempts` per cycle.
//! An attempt whose liveness signals stop growing for `stall_timeout` is
//! killed and recorded with [`TIMEOUT_EXIT_CODE`]. Between attempts an
//! optional dependency is restarted and probed for readiness.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{info, warn};

use relgate_core::{obs, ArtifactStore, RelgateError, Result, METRICS};

use crate::command::{kill_tree, CommandLine, TIMEOUT_EXIT_CODE};
use crate::dependency::DependencyManager;
use crate::liveness::{Heartbeat, LivenessProbe, ProcLiveness};

/// Summary file written into the log directory.
pub const WATCHDOG_SUMMARY_FILE: &str = "watchdog_summary.json";

#[derive(Debug, Clone, PartialEq)]
pub struct WatchdogPolicy {
    pub max_cycles: u32,
    pub max_attempts: u32,
    pub poll_interval: Duration,
    /// Idle time without liveness progress before an attempt is killed.
    pub stall_timeout: Duration,
    /// Hard wall-clock limit per attempt.
    pub attempt_timeout: Option<Duration>,
    pub ready_timeout: Duration,
}

impl Default for WatchdogPolicy {
    fn default() -> Self {
        Self {
            max_cycles: 1,
            max_attempts: 3,
            poll_interval: Duration::from_secs(30),
            stall_timeout: Duration::from_secs(20 * 60),
            attempt_timeout: None,
            ready_timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptPhase {
    Launched,
    Running,
    Passed,
    Failed,
    Stalled,
}

impl AttemptPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Passed | Self::Failed | Self::Stalled)
    }

    /// Move to `next`, rejecting transitions the state machine does not allow.
    pub fn advance(self, next: AttemptPhase) -> Result<AttemptPhase> {
        use AttemptPhase::*;
        match (self, next) {
            (Launched, Running) | (Running, Passed) | (Running, Failed) | (Running, Stalled) => {
                Ok(next)
            }
            _ => Err(RelgateError::InvalidInput(format!(
                "illegal attempt transition {self:?} -> {next:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Pass,
    Fail,
    Stalled,
    ServerUnavailable,
}

impl AttemptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Stalled => "stalled",
            Self::ServerUnavailable => "server_unavailable",
        }
    }
}

/// One finished attempt. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub cycle: u32,
    pub attempt: u32,
    pub status: AttemptStatus,
    pub exit_code: Option<i32>,
    pub elapsed_s: f64,
    pub log_paths: Vec<PathBuf>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleResult {
    pub cycle: u32,
    pub passed: bool,
    pub attempts: Vec<AttemptRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchdogSummary {
    pub command: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub max_attempts: u32,
    pub stall_timeout_s: f64,
    pub cycles: Vec<CycleResult>,
    pub passed: bool,
}

impl WatchdogSummary {
    pub fn exit_code(&self) -> i32 {
        if self.passed {
            0
        } else {
            1
        }
    }
}

pub struct Watchdog {
    policy: WatchdogPolicy,
    command: CommandLine,
    log_dir: PathBuf,
    probe: Box<dyn LivenessProbe>,
    dependency: Option<Box<dyn DependencyManager>>,
}

impl Watchdog {
    pub fn new(policy: WatchdogPolicy, command: CommandLine, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            policy,
            command,
            log_dir: log_dir.into(),
            probe: Box::new(ProcLiveness),
            dependency: None,
        }
    }

    pub fn with_probe(mut self, probe: impl LivenessProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    pub fn with_dependency(mut self, dependency: impl DependencyManager + 'static) -> Self {
        self.dependency = Some(Box::new(dependency));
        self
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Run all cycles, stopping at the first failed one, and persist the
    /// summary with its digest.
    pub async fn run(&self) -> Result<WatchdogSummary> {
        if self.command.is_empty() {
            return Err(RelgateError::InvalidInput("watchdog command is empty".to_string()));
        }
        std::fs::create_dir_all(&self.log_dir)?;
        let started_at = Utc::now();

        let mut cycles = Vec::new();
        for cycle in 1..=self.policy.max_cycles.max(1) {
            let result = self.run_cycle(cycle).await?;
            let passed = result.passed;
            cycles.push(result);
            if !passed {
                warn!(cycle, "cycle failed; stopping");
                break;
            }
        }

        let summary = WatchdogSummary {
            command: self.command.argv.clone(),
            started_at,
            finished_at: Utc::now(),
            max_attempts: self.policy.max_attempts,
            stall_timeout_s: self.policy.stall_timeout.as_secs_f64(),
            passed: !cycles.is_empty() && cycles.iter().all(|c| c.passed),
            cycles,
        };
        ArtifactStore::new(&self.log_dir)
            .write_json_with_digest(Path::new(WATCHDOG_SUMMARY_FILE), &summary)?;
        METRICS.flush();
        Ok(summary)
    }

    /// Attempts until one passes or the budget is spent.
    pub async fn run_cycle(&self, cycle: u32) -> Result<CycleResult> {
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        for attempt in 1..=self.policy.max_attempts.max(1) {
            if let Some(dep) = &self.dependency {
                if attempt > 1 {
                    if let Err(e) = dep.restart().await {
                        warn!(dependency = dep.name(), error = %e, "dependency restart failed");
                    }
                }
                if let Err(e) = dep.wait_ready(self.policy.ready_timeout).await {
                    let record = AttemptRecord {
                        cycle,
                        attempt,
                        status: AttemptStatus::ServerUnavailable,
                        exit_code: None,
                        elapsed_s: 0.0,
                        log_paths: Vec::new(),
                        started_at: Utc::now(),
                        detail: Some(e.to_string()),
                    };
                    obs::emit_attempt_finished(cycle, attempt, record.status.as_str(), None, 0.0);
                    attempts.push(record);
                    continue;
                }
            }

            let record = self.run_attempt(cycle, attempt).await?;
            let passed = record.status == AttemptStatus::Pass;
            attempts.push(record);
            if passed {
                return Ok(CycleResult {
                    cycle,
                    passed: true,
                    attempts,
                });
            }
        }
        Ok(CycleResult {
            cycle,
            passed: false,
            attempts,
        })
    }

    async fn run_attempt(&self, cycle: u32, attempt: u32) -> Result<AttemptRecord> {
        let stem = format!("cycle{cycle:02}_attempt{attempt:02}");
        let stdout_path = self.log_dir.join(format!("{stem}.stdout.log"));
        let stderr_path = self.log_dir.join(format!("{stem}.stderr.log"));
        let log_paths = vec![stdout_path.clone(), stderr_path.clone()];

        let mut cmd: Command = self.command.command(&[])?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::from(std::fs::File::create(&stdout_path)?))
            .stderr(Stdio::from(std::fs::File::create(&stderr_path)?))
            .env("RELGATE_WATCHDOG_CYCLE", cycle.to_string())
            .env("RELGATE_WATCHDOG_ATTEMPT", attempt.to_string())
            .kill_on_drop(true);

        let started_at = Utc::now();
        let start = Instant::now();
        let mut child = cmd.spawn()?;
        let pid = child.id();
        let mut phase = AttemptPhase::Launched;
        METRICS.inc_attempts_launched();
        obs::emit_attempt_started(cycle, attempt, pid);
        phase = phase.advance(AttemptPhase::Running)?;

        let mut seen = self.probe.sample(pid, &log_paths);
        let mut last_progress = Instant::now();
        let exit_code = loop {
            match tokio::time::timeout(self.policy.poll_interval, child.wait()).await {
                Ok(status) => {
                    let status = status?;
                    phase = phase.advance(if status.success() {
                        AttemptPhase::Passed
                    } else {
                        AttemptPhase::Failed
                    })?;
                    break status.code();
                }
                Err(_) => {
                    let beat: Heartbeat = self.probe.sample(pid, &log_paths);
                    if beat.progressed(&seen) {
                        last_progress = Instant::now();
                    }
                    seen = seen.max(beat);

                    let idle = last_progress.elapsed();
                    let over_budget = self
                        .policy
                        .attempt_timeout
                        .is_some_and(|limit| start.elapsed() >= limit);
                    if idle >= self.policy.stall_timeout || over_budget {
                        obs::emit_stalled(cycle, attempt, idle.as_secs_f64());
                        METRICS.inc_stalls_detected();
                        kill_tree(&mut child).await?;
                        phase = phase.advance(AttemptPhase::Stalled)?;
                        break Some(TIMEOUT_EXIT_CODE);
                    }
                }
            }
        };

        if !phase.is_terminal() {
            return Err(RelgateError::InvalidInput(format!(
                "attempt ended in non-terminal phase {phase:?}"
            )));
        }
        let status = match phase {
            AttemptPhase::Passed => AttemptStatus::Pass,
            AttemptPhase::Stalled => AttemptStatus::Stalled,
            _ => AttemptStatus::Fail,
        };
        let elapsed_s = start.elapsed().as_secs_f64();
        obs::emit_attempt_finished(cycle, attempt, status.as_str(), exit_code, elapsed_s);
        info!(cycle, attempt, status = status.as_str(), "attempt finished");

        Ok(AttemptRecord {
            cycle,
            attempt,
            status,
            exit_code,
            elapsed_s,
            log_paths,
            started_at,
            detail: None,
        })
    }
}
