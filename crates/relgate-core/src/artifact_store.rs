//! Artifact store accessor.
//!
//! Reads and writes JSON artifacts and "latest pointer" files, and resolves a
//! status from heterogeneous artifact shapes. Status extraction is an ordered
//! list of [`StatusStrategy`] values tried against the parsed document; the
//! first one that yields a string wins. New artifact shapes need one extra
//! strategy, nothing else.
//!
//! Nothing here caches: every [`ArtifactStore::read_record`] goes to disk.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use relgate_state::ContentDigest;

use crate::domain::{
    normalize_status, ArtifactRecord, RelgateError, Result, STATUS_UNKNOWN,
};

/// Extracts a status string from a parsed artifact.
pub trait StatusStrategy: Send + Sync {
    /// Short label used in debug logs.
    fn name(&self) -> &str;

    fn extract(&self, doc: &Value) -> Option<String>;
}

/// Reads a string at a JSON pointer (`/status`, `/overall/status`, ...).
#[derive(Debug, Clone)]
pub struct FieldPath {
    pointer: String,
}

impl FieldPath {
    pub fn new(pointer: impl Into<String>) -> Self {
        Self {
            pointer: pointer.into(),
        }
    }
}

impl StatusStrategy for FieldPath {
    fn name(&self) -> &str {
        &self.pointer
    }

    fn extract(&self, doc: &Value) -> Option<String> {
        doc.pointer(&self.pointer)
            .and_then(Value::as_str)
            .map(normalize_status)
            .filter(|s| !s.is_empty())
    }
}

/// Ordered status extraction strategies.
pub struct StatusResolver {
    strategies: Vec<Box<dyn StatusStrategy>>,
}

impl Default for StatusResolver {
    /// `status`, then `overall.status`, then `means.status`.
    fn default() -> Self {
        Self {
            strategies: vec![
                Box::new(FieldPath::new("/status")),
                Box::new(FieldPath::new("/overall/status")),
                Box::new(FieldPath::new("/means/status")),
            ],
        }
    }
}

impl StatusResolver {
    /// Append a lower-priority strategy.
    pub fn with_strategy(mut self, strategy: impl StatusStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// First matching status, or `None` when no strategy applies.
    pub fn resolve(&self, doc: &Value) -> Option<String> {
        for strategy in &self.strategies {
            if let Some(status) = strategy.extract(doc) {
                debug!(strategy = strategy.name(), status = %status, "status resolved");
                return Some(status);
            }
        }
        None
    }

    /// Like [`Self::resolve`] but defaults to `UNKNOWN`.
    pub fn resolve_or_unknown(&self, doc: &Value) -> String {
        self.resolve(doc)
            .unwrap_or_else(|| STATUS_UNKNOWN.to_string())
    }
}

const GENERATED_AT_KEYS: [&str; 2] = ["generated_at_utc", "generated_at"];
const DECLARED_FAILURE_POINTERS: [&str; 3] =
    ["/first_failure_reason", "/failure_reason", "/overall/failure_reason"];

/// Parse an RFC 3339 timestamp, or a naive ISO-8601 one taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Embedded generation timestamp, if present and parseable.
pub fn extract_generated_at(doc: &Value) -> Option<DateTime<Utc>> {
    GENERATED_AT_KEYS
        .iter()
        .find_map(|key| doc.get(*key).and_then(Value::as_str))
        .and_then(parse_timestamp)
}

fn extract_declared_failure(doc: &Value) -> Option<String> {
    DECLARED_FAILURE_POINTERS.iter().find_map(|p| {
        doc.pointer(p)
            .and_then(Value::as_str)
            .map(str::to_string)
            .filter(|s| !s.trim().is_empty())
    })
}

/// Read a number at the first pointer that yields one.
pub fn extract_f64(doc: &Value, pointers: &[&str]) -> Option<f64> {
    pointers
        .iter()
        .find_map(|p| doc.pointer(p).and_then(Value::as_f64))
}

/// Filesystem accessor for artifacts, rooted at `root` for relative paths.
pub struct ArtifactStore {
    root: PathBuf,
    resolver: StatusResolver,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            resolver: StatusResolver::default(),
        }
    }

    pub fn with_resolver(mut self, resolver: StatusResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolver(&self) -> &StatusResolver {
        &self.resolver
    }

    /// Absolute paths pass through; relative ones are joined to the root.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Read an artifact and derive its record. Never fails: unreadable or
    /// malformed files yield `UNKNOWN` with `parse_error` set.
    pub fn read_record(&self, path: &Path) -> ArtifactRecord {
        let path = self.resolve_path(path);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ArtifactRecord::missing(path);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "artifact unreadable");
                let mut rec = ArtifactRecord::missing(&path);
                rec.exists = true;
                rec.status = STATUS_UNKNOWN.to_string();
                rec.parse_error = Some(e.to_string());
                return rec;
            }
        };

        let modified_at = fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(doc) => ArtifactRecord {
                status: self.resolver.resolve_or_unknown(&doc),
                generated_at: extract_generated_at(&doc),
                declared_failure: extract_declared_failure(&doc),
                modified_at,
                exists: true,
                parse_error: None,
                path,
            },
            Err(e) => ArtifactRecord {
                status: STATUS_UNKNOWN.to_string(),
                generated_at: None,
                declared_failure: None,
                modified_at,
                exists: true,
                parse_error: Some(e.to_string()),
                path,
            },
        }
    }

    /// Read a JSON document, `None` if the file does not exist.
    pub fn read_json(&self, path: &Path) -> Result<Option<Value>> {
        let path = self.resolve_path(path);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RelgateError::Io(e)),
        }
    }

    /// Read and deserialize a JSON document that must exist.
    pub fn read_typed<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        match self.read_json(path)? {
            Some(doc) => Ok(serde_json::from_value(doc)?),
            None => Err(RelgateError::ArtifactMissing {
                path: self.resolve_path(path).display().to_string(),
            }),
        }
    }

    /// Overwrite `path` wholesale with pretty JSON. Returns the content digest.
    pub fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<ContentDigest> {
        let path = self.resolve_path(path);
        let bytes = serde_json::to_vec_pretty(value)?;
        write_atomic(&path, &bytes)?;
        Ok(ContentDigest::from_bytes(&bytes))
    }

    /// Write `path` plus a sibling `<path>.digest` holding its SHA-256.
    pub fn write_json_with_digest<T: Serialize>(
        &self,
        path: &Path,
        value: &T,
    ) -> Result<ContentDigest> {
        let digest = self.write_json(path, value)?;
        write_atomic(&digest_path(&self.resolve_path(path)), digest.as_str().as_bytes())?;
        Ok(digest)
    }

    /// Read `path` and verify it against its `.digest` sibling.
    pub fn read_json_verified<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let path = self.resolve_path(path);
        let bytes = fs::read(&path)?;
        let expected = fs::read_to_string(digest_path(&path))?;
        let actual = ContentDigest::from_bytes(&bytes);
        if expected.trim() != actual.as_str() {
            return Err(RelgateError::DigestMismatch {
                expected: expected.trim().to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Point `pointer` at `target`. The pointer file holds one path and a newline.
    pub fn update_latest_pointer(&self, pointer: &Path, target: &Path) -> Result<()> {
        let pointer = self.resolve_path(pointer);
        let target = self.resolve_path(target);
        write_atomic(&pointer, format!("{}\n", target.display()).as_bytes())?;
        debug!(pointer = %pointer.display(), target = %target.display(), "latest pointer updated");
        Ok(())
    }

    /// Follow a pointer file. `None` when the pointer does not exist or is empty.
    pub fn read_latest_pointer(&self, pointer: &Path) -> Result<Option<PathBuf>> {
        let pointer = self.resolve_path(pointer);
        match fs::read_to_string(&pointer) {
            Ok(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(PathBuf::from(trimmed)))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RelgateError::Io(e)),
        }
    }

    /// Most recently modified file in `dir` whose name matches `prefix`/`suffix`.
    /// Ties on modification time resolve to the lexicographically last name.
    pub fn resolve_latest_matching(
        &self,
        dir: &Path,
        prefix: &str,
        suffix: &str,
    ) -> Result<Option<PathBuf>> {
        let dir = self.resolve_path(dir);
        let entries = match fs::read_dir(&dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RelgateError::Io(e)),
        };

        let mut best: Option<(std::time::SystemTime, String, PathBuf)> = None;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with(prefix) || !name.ends_with(suffix) {
                continue;
            }
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified()?;
            let candidate = (modified, name, entry.path());
            best = match best {
                Some(current) if (&current.0, &current.1) >= (&candidate.0, &candidate.1) => {
                    Some(current)
                }
                _ => Some(candidate),
            };
        }
        Ok(best.map(|(_, _, path)| path))
    }
}

fn digest_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".digest");
    path.with_file_name(name)
}

/// Atomic write: temp file in the target directory, then rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;
    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (tempfile::TempDir, ArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn resolver_prefers_top_level_status() {
        let r = StatusResolver::default();
        let doc = json!({"status": "pass", "overall": {"status": "FAIL"}});
        assert_eq!(r.resolve(&doc).as_deref(), Some("PASS"));
    }

    #[test]
    fn resolver_falls_back_to_nested_shapes() {
        let r = StatusResolver::default();
        assert_eq!(
            r.resolve(&json!({"overall": {"status": "FAIL"}})).as_deref(),
            Some("FAIL")
        );
        assert_eq!(
            r.resolve(&json!({"means": {"status": "PASS"}})).as_deref(),
            Some("PASS")
        );
        assert_eq!(r.resolve_or_unknown(&json!({"score": 1.0})), "UNKNOWN");
    }

    #[test]
    fn resolver_accepts_extra_strategy() {
        let r = StatusResolver::default().with_strategy(FieldPath::new("/summary/verdict"));
        assert_eq!(
            r.resolve(&json!({"summary": {"verdict": "pass"}})).as_deref(),
            Some("PASS")
        );
    }

    #[test]
    fn missing_file_is_missing_record() {
        let (_dir, store) = store();
        let rec = store.read_record(Path::new("nope.json"));
        assert!(!rec.exists);
        assert_eq!(rec.status, "MISSING");
    }

    #[test]
    fn malformed_file_is_unknown() {
        let (dir, store) = store();
        std::fs::write(dir.path().join("bad.json"), b"{oops").unwrap();
        let rec = store.read_record(Path::new("bad.json"));
        assert!(rec.exists);
        assert_eq!(rec.status, "UNKNOWN");
        assert!(rec.parse_error.is_some());
    }

    #[test]
    fn record_extracts_generated_at_and_failure() {
        let (_dir, store) = store();
        store
            .write_json(
                Path::new("f.json"),
                &json!({
                    "status": "FAIL",
                    "generated_at_utc": "2026-01-02T03:04:05Z",
                    "failure_reason": "holdout below floor"
                }),
            )
            .unwrap();
        let rec = store.read_record(Path::new("f.json"));
        assert_eq!(rec.status, "FAIL");
        assert_eq!(
            rec.generated_at.unwrap().to_rfc3339(),
            "2026-01-02T03:04:05+00:00"
        );
        assert_eq!(rec.declared_failure.as_deref(), Some("holdout below floor"));
        assert!(rec.modified_at.is_some());
    }

    #[test]
    fn naive_timestamps_are_utc() {
        let ts = parse_timestamp("2026-01-02T03:04:05.250").unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-01-02T03:04:05.250+00:00");
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn digest_round_trip_and_tamper_detection() {
        let (dir, store) = store();
        let path = Path::new("out/matrix.json");
        store.write_json_with_digest(path, &json!({"status": "PASS"})).unwrap();
        let back: Value = store.read_json_verified(path).unwrap();
        assert_eq!(back["status"], "PASS");

        std::fs::write(dir.path().join("out/matrix.json"), b"{\"status\":\"FAIL\"}").unwrap();
        let err = store.read_json_verified::<Value>(path).unwrap_err();
        assert!(matches!(err, RelgateError::DigestMismatch { .. }));
    }

    #[test]
    fn latest_pointer_round_trip() {
        let (dir, store) = store();
        assert!(store.read_latest_pointer(Path::new("LATEST")).unwrap().is_none());
        store
            .update_latest_pointer(Path::new("LATEST"), Path::new("runs/a.json"))
            .unwrap();
        let target = store.read_latest_pointer(Path::new("LATEST")).unwrap().unwrap();
        assert_eq!(target, dir.path().join("runs/a.json"));
    }

    #[test]
    fn latest_matching_prefers_newest() {
        let (dir, store) = store();
        let runs = dir.path().join("runs");
        std::fs::create_dir_all(&runs).unwrap();
        std::fs::write(runs.join("matrix_001.json"), b"{}").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        std::fs::write(runs.join("matrix_002.json"), b"{}").unwrap();
        std::fs::write(runs.join("other_003.json"), b"{}").unwrap();

        let latest = store
            .resolve_latest_matching(Path::new("runs"), "matrix_", ".json")
            .unwrap()
            .unwrap();
        assert_eq!(latest.file_name().unwrap(), "matrix_002.json");
        assert!(store
            .resolve_latest_matching(Path::new("absent"), "m", ".json")
            .unwrap()
            .is_none());
    }
}
