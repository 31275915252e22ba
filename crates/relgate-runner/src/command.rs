//! External command execution for producer steps.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};
use tracing::{debug, warn};

use relgate_core::{ProducerStep, RelgateError, Result};

/// Exit code recorded when a process is killed for running too long or stalling.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// A program plus its fixed leading arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    pub argv: Vec<String>,
}

impl CommandLine {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
        }
    }

    /// Split on ASCII whitespace. No quoting rules.
    pub fn parse(raw: &str) -> Self {
        Self::new(raw.split_ascii_whitespace())
    }

    pub fn is_empty(&self) -> bool {
        self.argv.is_empty()
    }

    /// Build the command as the leader of a new process group, so that
    /// [`kill_tree`] reaches everything it spawns.
    pub(crate) fn command(&self, extra: &[String]) -> Result<Command> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| RelgateError::InvalidInput("empty command line".to_string()))?;
        let mut cmd = std::process::Command::new(program);
        cmd.args(args).args(extra);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        Ok(Command::from(cmd))
    }
}

/// Kill `child` together with its process group, then reap it.
pub(crate) async fn kill_tree(child: &mut Child) -> Result<()> {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            let group = format!("-{pid}");
            match Command::new("kill")
                .args(["-KILL", "--", group.as_str()])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
            {
                Ok(status) if status.success() => {}
                Ok(status) => debug!(pid, code = ?status.code(), "process group already gone"),
                Err(e) => warn!(pid, error = %e, "could not signal process group"),
            }
        }
    }
    child.kill().await?;
    Ok(())
}

/// Run one step to completion and report its exit code.
///
/// `timeout` of zero means no limit; on expiry the process is killed and
/// the step reports [`TIMEOUT_EXIT_CODE`]. Output is appended to `log_path`
/// when given and discarded otherwise.
pub async fn run_step(
    name: &str,
    command: &CommandLine,
    extra_args: &[String],
    timeout: Duration,
    log_path: Option<&Path>,
) -> Result<ProducerStep> {
    let start = Instant::now();
    let mut cmd = command.command(extra_args)?;
    match log_path {
        Some(path) => {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            let log = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            cmd.stdout(Stdio::from(log.try_clone()?))
                .stderr(Stdio::from(log));
        }
        None => {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
    }
    cmd.stdin(Stdio::null()).kill_on_drop(true);

    debug!(step = name, argv = ?command.argv, "spawning step");
    let mut child = cmd.spawn()?;

    let exit_code = if timeout.is_zero() {
        child.wait().await?.code().unwrap_or(-1)
    } else {
        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => status?.code().unwrap_or(-1),
            Err(_) => {
                warn!(step = name, timeout_s = timeout.as_secs_f64(), "step timed out; killing");
                kill_tree(&mut child).await?;
                TIMEOUT_EXIT_CODE
            }
        }
    };

    Ok(ProducerStep {
        name: name.to_string(),
        exit_code,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}
