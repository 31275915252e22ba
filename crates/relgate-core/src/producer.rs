//! Family producer boundary.
//!
//! The controller treats evaluation producers as opaque: it hands them a
//! family, a stage and an output path, then looks only at the exit code and
//! at the artifact they were expected to write.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{FamilySpec, Result};

/// Everything a producer is told about one invocation.
#[derive(Debug, Clone)]
pub struct ProducerRequest<'a> {
    pub family: &'a FamilySpec,
    /// Resolved (absolute or root-joined) artifact path.
    pub artifact_path: &'a Path,
    pub run_id: &'a str,
    pub matrix_started_at: DateTime<Utc>,
}

/// One external process run as part of producing a family.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProducerStep {
    pub name: String,
    pub exit_code: i32,
    pub duration_ms: u64,
}

/// What a producer invocation ended with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProducerOutcome {
    /// Exit code of the first failing step, or 0.
    pub exit_code: i32,
    pub steps: Vec<ProducerStep>,
}

impl ProducerOutcome {
    pub fn from_steps(steps: Vec<ProducerStep>) -> Self {
        let exit_code = steps
            .iter()
            .map(|s| s.exit_code)
            .find(|&code| code != 0)
            .unwrap_or(0);
        Self { exit_code, steps }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Produces the artifact for one evaluation family.
///
/// Implementations run synchronously from the caller's point of view: the
/// returned future resolves only once every external process has exited.
#[async_trait]
pub trait FamilyProducer: Send + Sync {
    async fn produce(&self, request: &ProducerRequest<'_>) -> Result<ProducerOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str, exit_code: i32) -> ProducerStep {
        ProducerStep {
            name: name.to_string(),
            exit_code,
            duration_ms: 1,
        }
    }

    #[test]
    fn test_outcome_reports_first_failure() {
        let o = ProducerOutcome::from_steps(vec![step("generate", 0), step("check", 2)]);
        assert_eq!(o.exit_code, 2);
        assert!(!o.succeeded());
    }

    #[test]
    fn test_outcome_all_zero_succeeds() {
        let o = ProducerOutcome::from_steps(vec![step("triplet", 0)]);
        assert!(o.succeeded());
    }
}
