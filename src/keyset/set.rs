//! Idempotent key inventory.

use crate::types::KeyOperation;
use std::collections::HashSet;

/// Change to the inventory caused by one feed event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyEvent {
    Added(String),
    Removed(String),
}

/// Keys currently known for one watch target.
///
/// Applying the same operation twice has the same effect as applying it once,
/// so redelivered feed events never produce duplicates.
#[derive(Clone, Debug, Default)]
pub struct KeySet {
    keys: HashSet<String>,
}

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one feed event. Returns the visible change, if any.
    pub fn apply(&mut self, key: &str, operation: KeyOperation) -> Option<KeyEvent> {
        if operation.is_removal() {
            self.keys
                .remove(key)
                .then(|| KeyEvent::Removed(key.to_string()))
        } else if self.keys.contains(key) {
            None
        } else {
            self.keys.insert(key.to_string());
            Some(KeyEvent::Added(key.to_string()))
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys in lexical order.
    pub fn sorted(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.keys.iter().cloned().collect();
        keys.sort();
        keys
    }
}
