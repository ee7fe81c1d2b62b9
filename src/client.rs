//! Interfaces to the messaging and storage backends.
//!
//! The monitor core never talks to the wire itself. A host plugs in a
//! connection implementing these traits; [`crate::memory`] provides an
//! in-process one.

use crate::error::Result;
use crate::types::{Headers, InboundMessage, KeyChange, KvEntry, StreamEntry};
use crossbeam_channel::Receiver;
use std::fmt;
use std::time::Duration;

/// A live, cancellable feed of items from a backend.
///
/// Items arrive on `receiver`. The backend signals the end of the feed (for
/// example a dropped connection) by disconnecting the channel.
pub struct Feed<T> {
    pub receiver: Receiver<T>,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> Feed<T> {
    pub fn new(receiver: Receiver<T>) -> Self {
        Self {
            receiver,
            cancel: None,
        }
    }

    /// Attach the hook run when the consumer cancels the feed.
    pub fn on_cancel(mut self, cancel: impl FnOnce() + Send + 'static) -> Self {
        self.cancel = Some(Box::new(cancel));
        self
    }

    /// Tell the backend to stop delivering. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl<T> fmt::Debug for Feed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feed")
            .field("pending", &self.receiver.len())
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

/// Publish/subscribe and request/reply messaging.
pub trait MessageClient: Send + Sync {
    /// Open a subscription on a subject (wildcards are backend-defined).
    fn subscribe(&self, subject: &str) -> Result<Feed<InboundMessage>>;

    fn publish(&self, subject: &str, data: &[u8], headers: Option<&Headers>) -> Result<()>;

    /// Send a request and wait for one reply.
    ///
    /// Fails with [`crate::MonitorError::Timeout`] when no reply arrives in time.
    fn request(
        &self,
        subject: &str,
        data: &[u8],
        headers: Option<&Headers>,
        timeout: Duration,
    ) -> Result<InboundMessage>;
}

/// A key-value bucket store with change feeds.
pub trait KeyValueStore: Send + Sync {
    /// Watch every key of a bucket. Existing keys are delivered first as puts.
    fn watch(&self, bucket: &str) -> Result<Feed<KeyChange>>;

    fn get(&self, bucket: &str, key: &str) -> Result<Option<KvEntry>>;

    /// Store a value, returning the new revision.
    fn put(&self, bucket: &str, key: &str, value: &[u8]) -> Result<u64>;

    fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    /// All retained revisions of one key, oldest first.
    fn history(&self, bucket: &str, key: &str) -> Result<Vec<KvEntry>>;
}

/// An append-only, sequence-addressed log.
pub trait RangedLog: Send + Sync {
    /// Read one entry. Fails when the position is missing or purged.
    fn entry_by_seq(&self, stream: &str, seq: u64) -> Result<StreamEntry>;
}
