//! In-process session state.
//!
//! Two maps: public keys form the reactive store that templates and watchers
//! see; keys starting with `_` go to a private map that is never part of a
//! [`MemoryState::snapshot`] and never emits change events.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

const WATCH_CAPACITY: usize = 64;

/// A change to a public key.
#[derive(Clone, Debug, PartialEq)]
pub struct StateChange {
    /// Key that changed.
    pub key: String,
    /// Value before the change.
    pub old: Option<Value>,
    /// Value after the change.
    pub new: Option<Value>,
}

/// Whether a key lives in the private map.
pub fn is_private_key(key: &str) -> bool {
    key.starts_with('_')
}

/// Reactive key-value state.
pub struct MemoryState {
    public: RwLock<HashMap<String, Value>>,
    private: RwLock<HashMap<String, Value>>,
    changes: broadcast::Sender<StateChange>,
}

impl MemoryState {
    /// Empty state.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            public: RwLock::new(HashMap::new()),
            private: RwLock::new(HashMap::new()),
            changes,
        }
    }

    fn map(&self, key: &str) -> &RwLock<HashMap<String, Value>> {
        if is_private_key(key) { &self.private } else { &self.public }
    }

    /// Read a key.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.map(key).read().get(key).cloned()
    }

    /// Write a key. `None` or `Null` removes it. Public changes are broadcast
    /// when the value actually differs.
    pub fn set(&self, key: &str, value: Option<Value>) {
        let value = value.filter(|v| !v.is_null());
        let old = {
            let mut map = self.map(key).write();
            match &value {
                Some(v) => map.insert(key.to_string(), v.clone()),
                None => map.remove(key),
            }
        };
        if is_private_key(key) || old == value {
            return;
        }
        // no receivers is fine
        let _ = self.changes.send(StateChange {
            key: key.to_string(),
            old,
            new: value,
        });
    }

    /// Subscribe to public key changes.
    pub fn watch(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    /// Public keys only, for hydration into rendered output.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.public
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl Default for MemoryState {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
