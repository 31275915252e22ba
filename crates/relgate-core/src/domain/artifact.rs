//! Artifact records derived from family output files.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const STATUS_PASS: &str = "PASS";
pub const STATUS_FAIL: &str = "FAIL";
/// File exists but exposes no recognizable status.
pub const STATUS_UNKNOWN: &str = "UNKNOWN";
/// File does not exist.
pub const STATUS_MISSING: &str = "MISSING";
/// File predates the run that was supposed to rewrite it.
pub const STATUS_STALE: &str = "STALE";

/// Canonical status spelling: trimmed, upper-case.
pub fn normalize_status(status: &str) -> String {
    status.trim().to_ascii_uppercase()
}

/// Snapshot of one artifact file, read fresh from disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactRecord {
    pub path: PathBuf,
    pub status: String,
    /// Embedded `generated_at_utc` (or `generated_at`), if present and parseable.
    pub generated_at: Option<DateTime<Utc>>,
    /// On-disk modification time.
    pub modified_at: Option<DateTime<Utc>>,
    pub exists: bool,
    /// Failure reason the producer itself declared, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_failure: Option<String>,
    /// Set when the file exists but is not valid JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

impl ArtifactRecord {
    pub fn missing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            status: STATUS_MISSING.to_string(),
            generated_at: None,
            modified_at: None,
            exists: false,
            declared_failure: None,
            parse_error: None,
        }
    }

    pub fn is_missing(&self) -> bool {
        !self.exists
    }

    /// Written at or after `floor`: the mtime (or embedded stamp when there
    /// is no mtime) must not predate it, nor may an embedded stamp.
    pub fn produced_since(&self, floor: DateTime<Utc>) -> bool {
        self.exists
            && self
                .modified_at
                .or(self.generated_at)
                .is_some_and(|ts| ts >= floor)
            && self.generated_at.map_or(true, |ts| ts >= floor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_status() {
        assert_eq!(normalize_status(" pass\n"), "PASS");
        assert_eq!(normalize_status("Warn"), "WARN");
    }

    #[test]
    fn test_missing_record() {
        let rec = ArtifactRecord::missing("a/b.json");
        assert!(rec.is_missing());
        assert_eq!(rec.status, STATUS_MISSING);
        assert!(!rec.produced_since(Utc::now()));
    }

    #[test]
    fn test_produced_since_checks_both_timestamps() {
        let floor = Utc::now();
        let before = floor - chrono::Duration::days(2);
        let after = floor + chrono::Duration::seconds(1);
        let rec = |mtime, stamped| ArtifactRecord {
            modified_at: mtime,
            generated_at: stamped,
            exists: true,
            status: STATUS_PASS.to_string(),
            ..ArtifactRecord::missing("s.json")
        };
        assert!(rec(Some(after), None).produced_since(floor));
        assert!(rec(Some(after), Some(after)).produced_since(floor));
        assert!(!rec(Some(after), Some(before)).produced_since(floor));
        assert!(!rec(Some(before), None).produced_since(floor));
        assert!(rec(None, Some(after)).produced_since(floor));
        assert!(!rec(None, None).produced_since(floor));
    }
}
