//! Trait contract tests for StateStore.
//!
//! Every conforming implementation (filesystem and in-memory) must pass these.

use relgate_state::{load_typed, save_typed, FsStateStore, MemoryStateStore, StateStore};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Rotation {
    list: Vec<String>,
    index: usize,
}

fn stores() -> (tempfile::TempDir, Vec<Box<dyn StateStore>>) {
    let dir = tempfile::tempdir().unwrap();
    let fs = FsStateStore::new(dir.path()).unwrap();
    (dir, vec![Box::new(fs), Box::new(MemoryStateStore::new())])
}

#[test]
fn load_of_unsaved_key_is_none() {
    let (_dir, stores) = stores();
    for store in &stores {
        assert!(store.load("rotation").unwrap().is_none());
    }
}

#[test]
fn typed_round_trip() {
    let (_dir, stores) = stores();
    let state = Rotation {
        list: vec!["a".into(), "b".into()],
        index: 1,
    };
    for store in &stores {
        save_typed(store.as_ref(), "rotation", &state).unwrap();
        let back: Rotation = load_typed(store.as_ref(), "rotation").unwrap().unwrap();
        assert_eq!(back, state);
    }
}

#[test]
fn save_digest_matches_across_backends() {
    let (_dir, stores) = stores();
    let doc = json!({"list": ["x"], "index": 0});
    let digests: Vec<_> = stores.iter().map(|s| s.save("d", &doc).unwrap()).collect();
    assert_eq!(digests[0], digests[1]);
}

#[test]
fn delete_is_idempotent() {
    let (_dir, stores) = stores();
    for store in &stores {
        store.save("gone", &json!(true)).unwrap();
        store.delete("gone").unwrap();
        store.delete("gone").unwrap();
        assert!(store.load("gone").unwrap().is_none());
    }
}

#[test]
fn invalid_keys_rejected_everywhere() {
    let (_dir, stores) = stores();
    for store in &stores {
        assert!(store.load("../x").is_err());
        assert!(store.save("a/b", &json!(1)).is_err());
    }
}
