//! Round-robin holdout rotation.
//!
//! Each selection returns `list[index % len]` and persists the advanced
//! index before returning, so a crash after selection never replays the
//! same holdout (at-most-once per selection).

use serde::{Deserialize, Serialize};
use tracing::info;

use relgate_state::{load_typed, save_typed, StateStore};

use crate::domain::Result;
use crate::obs;

/// State-store key of the rotation document.
pub const ROTATION_STATE_KEY: &str = "holdout_rotation";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RotationState {
    pub list: Vec<String>,
    pub index: usize,
}

/// One selection result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPick {
    pub holdout: String,
    /// Index the holdout was taken from.
    pub index: usize,
    /// Index persisted for the next selection.
    pub next_index: usize,
}

/// Sole writer of [`ROTATION_STATE_KEY`].
pub struct HoldoutRotation<'a> {
    store: &'a dyn StateStore,
}

impl<'a> HoldoutRotation<'a> {
    pub fn new(store: &'a dyn StateStore) -> Self {
        Self { store }
    }

    pub fn state(&self) -> Result<RotationState> {
        Ok(load_typed(self.store, ROTATION_STATE_KEY)?.unwrap_or_default())
    }

    /// Seed or overwrite the persisted state.
    pub fn reset(&self, list: Vec<String>, index: usize) -> Result<()> {
        save_typed(self.store, ROTATION_STATE_KEY, &RotationState { list, index })?;
        Ok(())
    }

    /// Select the next holdout.
    ///
    /// `configured` replaces the stored list when it differs (the index then
    /// restarts at 0); pass an empty slice to rotate the stored list as is.
    /// With no list at all the caller's `default` is returned and nothing is
    /// written.
    pub fn next(&self, configured: &[String], default: &str) -> Result<RotationPick> {
        let mut state = self.state()?;
        if !configured.is_empty() && state.list != configured {
            info!(
                previous = state.list.len(),
                configured = configured.len(),
                "rotation list changed, restarting at index 0"
            );
            state = RotationState {
                list: configured.to_vec(),
                index: 0,
            };
        }

        if state.list.is_empty() {
            return Ok(RotationPick {
                holdout: default.to_string(),
                index: 0,
                next_index: 0,
            });
        }

        let len = state.list.len();
        let index = state.index % len;
        let holdout = state.list[index].clone();
        let next_index = (index + 1) % len;
        state.index = next_index;
        save_typed(self.store, ROTATION_STATE_KEY, &state)?;

        obs::emit_rotation_selected(&holdout, index, next_index);
        Ok(RotationPick {
            holdout,
            index,
            next_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relgate_state::MemoryStateStore;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn selects_at_index_and_wraps() {
        let store = MemoryStateStore::new();
        let rotation = HoldoutRotation::new(&store);
        rotation.reset(names(&["a", "b", "c"]), 2).unwrap();

        let pick = rotation.next(&[], "default").unwrap();
        assert_eq!(pick.holdout, "c");
        assert_eq!(pick.next_index, 0);
        assert_eq!(rotation.state().unwrap().index, 0);
    }

    #[test]
    fn n_selections_cover_the_list_once() {
        let store = MemoryStateStore::new();
        let rotation = HoldoutRotation::new(&store);
        let list = names(&["h1", "h2", "h3", "h4"]);

        let picks: Vec<String> = (0..list.len())
            .map(|_| rotation.next(&list, "x").unwrap().holdout)
            .collect();
        assert_eq!(picks, list);
        assert_eq!(rotation.next(&list, "x").unwrap().holdout, "h1");
    }

    #[test]
    fn empty_list_keeps_default_and_writes_nothing() {
        let store = MemoryStateStore::new();
        let rotation = HoldoutRotation::new(&store);
        let pick = rotation.next(&[], "main").unwrap();
        assert_eq!(pick.holdout, "main");
        assert!(store.is_empty());
    }

    #[test]
    fn changed_list_restarts() {
        let store = MemoryStateStore::new();
        let rotation = HoldoutRotation::new(&store);
        rotation.reset(names(&["a", "b"]), 1).unwrap();
        let pick = rotation.next(&names(&["x", "y", "z"]), "d").unwrap();
        assert_eq!(pick.holdout, "x");
        assert_eq!(rotation.state().unwrap().list, names(&["x", "y", "z"]));
    }

    #[test]
    fn out_of_range_index_is_reduced() {
        let store = MemoryStateStore::new();
        let rotation = HoldoutRotation::new(&store);
        rotation.reset(names(&["a", "b"]), 7).unwrap();
        assert_eq!(rotation.next(&[], "d").unwrap().holdout, "b");
    }
}
