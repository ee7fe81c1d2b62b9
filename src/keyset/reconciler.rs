//! Live key inventory for one watch target.

use super::set::{KeyEvent, KeySet};
use crate::client::{Feed, KeyValueStore};
use crate::error::Result;
use crate::types::KeyChange;
use crossbeam_channel::{bounded, select, Receiver, Sender, TryRecvError};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Lifecycle of a watch as reported to the listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchStatus {
    Opened,
    /// Closed by the caller.
    Closed,
    /// The feed ended on its own; the known keys are now stale.
    Failed,
}

/// Presentation callbacks for the key inventory.
pub trait KeySetListener: Send + Sync {
    fn on_key_added(&self, _key: &str) {}
    fn on_key_removed(&self, _key: &str) {}
    fn on_watch_status(&self, _target: &str, _status: WatchStatus) {}
}

/// Listener that ignores everything.
pub struct NoopListener;

impl KeySetListener for NoopListener {}

struct ActiveWatch {
    target: String,
    stop: Sender<()>,
    thread: JoinHandle<()>,
    listener: Arc<dyn KeySetListener>,
}

impl ActiveWatch {
    fn stop(self) -> (String, Arc<dyn KeySetListener>) {
        drop(self.stop);
        if self.thread.join().is_err() {
            tracing::warn!(watch = %self.target, "watch task panicked");
        }
        (self.target, self.listener)
    }

    /// Stop and report `Closed` to the listener the watch was opened with.
    fn close(self) -> String {
        let (target, listener) = self.stop();
        listener.on_watch_status(&target, WatchStatus::Closed);
        target
    }
}

struct WatchState {
    target: Option<String>,
    /// Each open gets a fresh set, so a superseded task can't touch it.
    keys: Arc<RwLock<KeySet>>,
    active: Option<ActiveWatch>,
}

fn watch_loop(
    target: String,
    mut feed: Feed<KeyChange>,
    stop: Receiver<()>,
    keys: Arc<RwLock<KeySet>>,
    listener: Arc<dyn KeySetListener>,
) {
    loop {
        if !matches!(stop.try_recv(), Err(TryRecvError::Empty)) {
            break;
        }
        select! {
            recv(feed.receiver) -> change => match change {
                Ok(change) => {
                    let event = keys.write().apply(&change.key, change.operation);
                    match event {
                        Some(KeyEvent::Added(key)) => listener.on_key_added(&key),
                        Some(KeyEvent::Removed(key)) => listener.on_key_removed(&key),
                        None => {}
                    }
                }
                Err(_) => {
                    tracing::warn!(watch = %target, "watch feed ended, key list may be stale");
                    listener.on_watch_status(&target, WatchStatus::Failed);
                    break;
                }
            },
            recv(stop) -> _ => break,
        }
    }
    feed.cancel();
}

/// Keeps the set of keys for the currently open target in step with its
/// change feed.
///
/// At most one target is watched at a time; opening another stops the previous
/// watch first. Open, close and reset run one at a time, so overlapping opens
/// never share a key set.
pub struct KeySetReconciler {
    ops: Mutex<()>,
    state: Mutex<WatchState>,
}

impl KeySetReconciler {
    pub fn new() -> Self {
        Self {
            ops: Mutex::new(()),
            state: Mutex::new(WatchState {
                target: None,
                keys: Arc::new(RwLock::new(KeySet::new())),
                active: None,
            }),
        }
    }

    /// Stop any previous watch, reset the key set, and watch `target`.
    ///
    /// The replaced watch reports [`WatchStatus::Closed`] to its own listener.
    pub fn open(
        &self,
        store: &dyn KeyValueStore,
        target: &str,
        listener: Arc<dyn KeySetListener>,
    ) -> Result<()> {
        let _ops = self.ops.lock();

        let keys = Arc::new(RwLock::new(KeySet::new()));
        let previous = {
            let mut state = self.state.lock();
            state.target = Some(target.to_string());
            state.keys = Arc::clone(&keys);
            state.active.take()
        };
        if let Some(previous) = previous {
            tracing::debug!(previous = %previous.target, next = %target, "replacing watch");
            previous.close();
        }

        let feed = store.watch(target)?;
        let (stop_tx, stop_rx) = bounded(1);

        let name = target.to_string();
        let task_listener = Arc::clone(&listener);
        let thread = thread::Builder::new()
            .name(format!("watch-{}", target))
            .spawn(move || watch_loop(name, feed, stop_rx, keys, task_listener))?;

        self.state.lock().active = Some(ActiveWatch {
            target: target.to_string(),
            stop: stop_tx,
            thread,
            listener: Arc::clone(&listener),
        });

        tracing::info!(watch = %target, "watch opened");
        listener.on_watch_status(target, WatchStatus::Opened);
        Ok(())
    }

    /// Stop the feed and keep the last known keys.
    ///
    /// Returns false when nothing was being watched.
    pub fn close(&self) -> bool {
        let _ops = self.ops.lock();
        self.close_active()
    }

    fn close_active(&self) -> bool {
        let active = self.state.lock().active.take();
        match active {
            Some(active) => {
                let target = active.close();
                tracing::info!(watch = %target, "watch closed");
                true
            }
            None => false,
        }
    }

    /// Close and forget the target and its keys.
    pub fn reset(&self) {
        let _ops = self.ops.lock();
        self.close_active();
        let mut state = self.state.lock();
        state.target = None;
        state.keys = Arc::new(RwLock::new(KeySet::new()));
    }

    /// The open target, or the last one if closed.
    pub fn target(&self) -> Option<String> {
        self.state.lock().target.clone()
    }

    pub fn is_watching(&self) -> bool {
        self.state
            .lock()
            .active
            .as_ref()
            .is_some_and(|a| !a.thread.is_finished())
    }

    fn keys_handle(&self) -> Arc<RwLock<KeySet>> {
        Arc::clone(&self.state.lock().keys)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys_handle().read().contains(key)
    }

    /// Known keys in lexical order.
    pub fn keys(&self) -> Vec<String> {
        self.keys_handle().read().sorted()
    }

    pub fn key_count(&self) -> usize {
        self.keys_handle().read().len()
    }
}

impl Default for KeySetReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for KeySetReconciler {
    fn drop(&mut self) {
        if let Some(active) = self.state.get_mut().active.take() {
            active.stop();
        }
    }
}
