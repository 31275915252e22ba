//! Environment-driven state configuration.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::fs_store::FsStateStore;
use crate::storage_traits::{StateStore, StorageResult};

/// Default state directory, relative to the working directory.
pub const DEFAULT_STATE_DIR: &str = ".relgate/state";

/// Where persisted control state lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateConfig {
    pub state_dir: PathBuf,
}

impl StateConfig {
    /// Load configuration from environment variables:
    /// - RELGATE_STATE_DIR (optional, default: ".relgate/state")
    pub fn from_env() -> Self {
        let state_dir = std::env::var("RELGATE_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_STATE_DIR));
        Self { state_dir }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
        }
    }
}

/// Open the filesystem store described by the environment.
pub fn open_state_store_from_env() -> StorageResult<Arc<dyn StateStore>> {
    let config = StateConfig::from_env();
    info!(state_dir = %config.state_dir.display(), "opening state store");
    Ok(Arc::new(FsStateStore::new(&config.state_dir)?))
}
