//! In-process key-value buckets.

use crate::client::{Feed, KeyValueStore};
use crate::error::{MonitorError, Result};
use crate::types::{KeyChange, KeyOperation, KvEntry, Timestamp};
use crossbeam_channel::{unbounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct Bucket {
    revision: u64,
    /// Every retained revision, oldest first.
    entries: Vec<KvEntry>,
    watchers: HashMap<u64, Sender<KeyChange>>,
}

impl Bucket {
    fn latest(&self, key: &str) -> Option<&KvEntry> {
        self.entries.iter().rev().find(|e| e.key == key)
    }

    /// Keys whose latest revision is a put, in first-write order.
    fn live_keys(&self) -> Vec<(String, u64)> {
        let mut keys: Vec<(String, u64)> = Vec::new();
        for entry in &self.entries {
            if keys.iter().any(|(k, _)| *k == entry.key) {
                continue;
            }
            if let Some(latest) = self.latest(&entry.key) {
                if latest.operation == KeyOperation::Put {
                    keys.push((latest.key.clone(), latest.revision));
                }
            }
        }
        keys
    }

    fn record(&mut self, key: &str, value: Vec<u8>, operation: KeyOperation) -> u64 {
        self.revision += 1;
        let revision = self.revision;
        self.entries.push(KvEntry {
            key: key.to_string(),
            value,
            revision,
            operation,
            created: Timestamp::now(),
        });
        self.notify(KeyChange {
            key: key.to_string(),
            operation,
            revision,
        });
        revision
    }

    fn notify(&mut self, change: KeyChange) {
        self.watchers
            .retain(|_, watcher| watcher.send(change.clone()).is_ok());
    }
}

/// Revisioned key-value buckets living in the current process.
pub struct MemoryKv {
    buckets: Arc<RwLock<HashMap<String, Bucket>>>,
    next_watch_id: AtomicU64,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self {
            buckets: Arc::new(RwLock::new(HashMap::new())),
            next_watch_id: AtomicU64::new(1),
        }
    }

    /// Create an empty bucket. Existing buckets are left alone.
    pub fn create_bucket(&self, name: &str) {
        self.buckets.write().entry(name.to_string()).or_default();
    }

    /// Drop every revision of a key and notify watchers with a purge.
    pub fn purge(&self, bucket: &str, key: &str) -> Result<()> {
        let mut buckets = self.buckets.write();
        let b = buckets
            .get_mut(bucket)
            .ok_or_else(|| MonitorError::NotFound(format!("bucket {}", bucket)))?;
        b.entries.retain(|e| e.key != key);
        b.record(key, Vec::new(), KeyOperation::Purge);
        // The purge marker itself is not retained history.
        b.entries.retain(|e| e.key != key);
        Ok(())
    }

    /// Number of open watch feeds on a bucket.
    pub fn watcher_count(&self, bucket: &str) -> usize {
        self.buckets
            .read()
            .get(bucket)
            .map_or(0, |b| b.watchers.len())
    }

    /// End every open watch feed, as a lost connection would.
    pub fn disconnect_watchers(&self) {
        for bucket in self.buckets.write().values_mut() {
            bucket.watchers.clear();
        }
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryKv {
    fn watch(&self, bucket: &str) -> Result<Feed<KeyChange>> {
        let mut buckets = self.buckets.write();
        let b = buckets
            .get_mut(bucket)
            .ok_or_else(|| MonitorError::NotFound(format!("bucket {}", bucket)))?;

        let (sender, receiver) = unbounded();
        for (key, revision) in b.live_keys() {
            let _ = sender.send(KeyChange {
                key,
                operation: KeyOperation::Put,
                revision,
            });
        }

        let id = self.next_watch_id.fetch_add(1, Ordering::SeqCst);
        b.watchers.insert(id, sender);

        let registry = Arc::clone(&self.buckets);
        let name = bucket.to_string();
        Ok(Feed::new(receiver).on_cancel(move || {
            if let Some(b) = registry.write().get_mut(&name) {
                b.watchers.remove(&id);
            }
        }))
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Option<KvEntry>> {
        let buckets = self.buckets.read();
        let b = buckets
            .get(bucket)
            .ok_or_else(|| MonitorError::NotFound(format!("bucket {}", bucket)))?;
        Ok(b
            .latest(key)
            .filter(|e| e.operation == KeyOperation::Put)
            .cloned())
    }

    fn put(&self, bucket: &str, key: &str, value: &[u8]) -> Result<u64> {
        let mut buckets = self.buckets.write();
        let b = buckets.entry(bucket.to_string()).or_default();
        Ok(b.record(key, value.to_vec(), KeyOperation::Put))
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let mut buckets = self.buckets.write();
        let b = buckets
            .get_mut(bucket)
            .ok_or_else(|| MonitorError::NotFound(format!("bucket {}", bucket)))?;
        b.record(key, Vec::new(), KeyOperation::Delete);
        Ok(())
    }

    fn history(&self, bucket: &str, key: &str) -> Result<Vec<KvEntry>> {
        let buckets = self.buckets.read();
        let b = buckets
            .get(bucket)
            .ok_or_else(|| MonitorError::NotFound(format!("bucket {}", bucket)))?;
        Ok(b.entries.iter().filter(|e| e.key == key).cloned().collect())
    }
}
