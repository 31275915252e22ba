//! In-memory fake for [`StateStore`] (testing only)

use std::collections::HashMap;
use std::sync::Mutex;

use crate::storage_traits::*;

/// In-memory state store backed by a `HashMap<key, Value>`.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    docs: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.docs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, key: &str) -> StorageResult<Option<serde_json::Value>> {
        validate_key(key)?;
        let docs = self.docs.lock().unwrap();
        Ok(docs.get(key).cloned())
    }

    fn save(&self, key: &str, value: &serde_json::Value) -> StorageResult<ContentDigest> {
        validate_key(key)?;
        let bytes = serde_json::to_vec_pretty(value).map_err(|e| {
            crate::StorageError::Serialization {
                key: key.to_string(),
                message: e.to_string(),
            }
        })?;
        let mut docs = self.docs.lock().unwrap();
        docs.insert(key.to_string(), value.clone());
        Ok(ContentDigest::from_bytes(&bytes))
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        let mut docs = self.docs.lock().unwrap();
        docs.remove(key);
        Ok(())
    }
}
