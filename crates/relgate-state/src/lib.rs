//! relgate-state: persisted control state for the reliability-gate controller.
//!
//! ## Layer 0 - Persistence
//!
//! Every piece of cross-run mutable state the controller owns (holdout
//! rotation index, curriculum decisions) goes through the [`StateStore`]
//! trait. Documents are read, modified in memory, and persisted wholesale;
//! there is no partial patching and no locking. One writer per state
//! document per invocation is an operational constraint, not an enforced one.
//!
//! ## Key Components
//!
//! - `StateStore`: named JSON documents, overwritten atomically
//! - `FsStateStore`: one `<key>.json` file per document under a root dir
//! - `MemoryStateStore`: in-memory fake for tests
//! - `ContentDigest`: SHA-256 digest of persisted bytes

mod config;
mod error;
pub mod fakes;
mod fs_store;
pub mod storage_traits;

pub use config::{open_state_store_from_env, StateConfig, DEFAULT_STATE_DIR};
pub use error::StorageError;
pub use fakes::MemoryStateStore;
pub use fs_store::FsStateStore;
pub use storage_traits::{
    load_typed, save_typed, validate_key, ContentDigest, StateStore, StorageResult,
};
