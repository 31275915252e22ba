//! External dependency (inference server) restart and readiness probing.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use relgate_core::{RelgateError, Result};

use crate::command::{run_step, CommandLine};

#[async_trait]
pub trait DependencyManager: Send + Sync {
    fn name(&self) -> &str;

    async fn restart(&self) -> Result<()>;

    /// Resolve once the dependency answers, or fail with
    /// [`RelgateError::ServerUnavailable`] after `timeout`.
    async fn wait_ready(&self, timeout: Duration) -> Result<()>;
}

/// HTTP server restarted by a shell command and probed with `GET health_url`.
pub struct HttpDependency {
    name: String,
    health_url: String,
    restart_command: Option<CommandLine>,
    probe_interval: Duration,
    client: reqwest::Client,
}

impl HttpDependency {
    pub fn new(name: impl Into<String>, health_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            health_url: health_url.into(),
            restart_command: None,
            probe_interval: Duration::from_secs(5),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_restart_command(mut self, command: CommandLine) -> Self {
        self.restart_command = Some(command).filter(|c| !c.is_empty());
        self
    }

    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    async fn probe_once(&self) -> bool {
        match self
            .client
            .get(&self.health_url)
            .timeout(self.probe_interval.max(Duration::from_secs(1)))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(url = %self.health_url, error = %e, "readiness probe failed");
                false
            }
        }
    }
}

#[async_trait]
impl DependencyManager for HttpDependency {
    fn name(&self) -> &str {
        &self.name
    }

    async fn restart(&self) -> Result<()> {
        let Some(command) = &self.restart_command else {
            debug!(dependency = %self.name, "no restart command configured");
            return Ok(());
        };
        info!(dependency = %self.name, "restarting dependency");
        let step = run_step("restart", command, &[], Duration::from_secs(600), None).await?;
        if step.exit_code != 0 {
            return Err(RelgateError::ServerUnavailable(format!(
                "{} restart exited with {}",
                self.name, step.exit_code
            )));
        }
        Ok(())
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.probe_once().await {
                debug!(dependency = %self.name, "dependency ready");
                return Ok(());
            }
            if Instant::now() >= deadline {
                warn!(dependency = %self.name, url = %self.health_url, "dependency not ready");
                return Err(RelgateError::ServerUnavailable(format!(
                    "{} not ready at {} after {:.0}s",
                    self.name,
                    self.health_url,
                    timeout.as_secs_f64()
                )));
            }
            tokio::time::sleep(self.probe_interval).await;
        }
    }
}
