//! Storage trait definitions for relgate control state.
//!
//! `StateStore` is a flat namespace of JSON documents keyed by short names
//! (`rotation`, `curriculum`, ...). Implementations must replace a document
//! wholesale on `save`; readers never observe a half-written document.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Content digest (SHA-256 hex string).
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read-modify-persist store for named JSON documents.
///
/// Guarantees:
/// - `load` of a key never saved returns `Ok(None)`.
/// - `save` replaces the whole document and returns the digest of the
///   bytes that were persisted.
/// - Keys are validated with [`validate_key`] before any I/O.
pub trait StateStore: Send + Sync {
    /// Load a document, or `None` if it has never been saved.
    fn load(&self, key: &str) -> StorageResult<Option<serde_json::Value>>;

    /// Persist a document, overwriting any previous version.
    fn save(&self, key: &str, value: &serde_json::Value) -> StorageResult<ContentDigest>;

    /// Remove a document. No-op if absent.
    fn delete(&self, key: &str) -> StorageResult<()>;
}

/// Reject keys that could escape the store namespace.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let ok = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidKey {
            key: key.to_string(),
        })
    }
}

/// Load and deserialize a typed document.
pub fn load_typed<T: DeserializeOwned>(
    store: &dyn StateStore,
    key: &str,
) -> StorageResult<Option<T>> {
    match store.load(key)? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| StorageError::Serialization {
                key: key.to_string(),
                message: e.to_string(),
            }),
        None => Ok(None),
    }
}

/// Serialize and persist a typed document.
pub fn save_typed<T: Serialize>(
    store: &dyn StateStore,
    key: &str,
    value: &T,
) -> StorageResult<ContentDigest> {
    let json = serde_json::to_value(value).map_err(|e| StorageError::Serialization {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    store.save(key, &json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_hex() {
        let d = ContentDigest::from_bytes(b"abc");
        assert_eq!(d.as_str().len(), 64);
        assert_eq!(d, ContentDigest::from_bytes(b"abc"));
        assert_eq!(d.short().len(), 12);
    }

    #[test]
    fn digest_try_from_rejects_garbage() {
        assert!(ContentDigest::try_from("xyz".to_string()).is_err());
        let ok = ContentDigest::from_bytes(b"x").as_str().to_ascii_uppercase();
        assert!(ContentDigest::try_from(ok).is_ok());
    }

    #[test]
    fn keys_are_validated() {
        assert!(validate_key("rotation").is_ok());
        assert!(validate_key("curriculum.v1").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("../escape").is_err());
        assert!(validate_key("a/b").is_err());
        assert!(validate_key(".hidden").is_err());
    }
}
