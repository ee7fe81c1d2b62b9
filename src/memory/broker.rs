//! In-process message broker.

use crate::client::{Feed, MessageClient};
use crate::error::{MonitorError, Result};
use crate::types::{Headers, InboundMessage};
use crossbeam_channel::{bounded, unbounded, RecvTimeoutError, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

type Responder = Arc<dyn Fn(&InboundMessage) -> Option<Vec<u8>> + Send + Sync>;

struct Subscriber {
    pattern: String,
    sender: Sender<InboundMessage>,
}

/// Check a subject against a pattern.
///
/// Tokens are dot-separated. `*` matches exactly one token, `>` matches one
/// or more trailing tokens.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut subject_tokens = subject.split('.');
    for token in pattern.split('.') {
        match token {
            ">" => return subject_tokens.next().is_some(),
            "*" => {
                if subject_tokens.next().is_none() {
                    return false;
                }
            }
            literal => {
                if subject_tokens.next() != Some(literal) {
                    return false;
                }
            }
        }
    }
    subject_tokens.next().is_none()
}

/// Pub/sub broker living in the current process.
pub struct MemoryBroker {
    subscribers: Arc<RwLock<HashMap<u64, Subscriber>>>,
    responders: RwLock<Vec<(String, Responder)>>,
    next_id: AtomicU64,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            responders: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Answer requests on subjects matching `pattern`.
    ///
    /// Returning `None` from the handler sends no reply, so the requester
    /// times out.
    pub fn respond<F>(&self, pattern: impl Into<String>, handler: F)
    where
        F: Fn(&InboundMessage) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        self.responders.write().push((pattern.into(), Arc::new(handler)));
    }

    /// Number of open subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// End every open feed, as a lost connection would.
    pub fn disconnect(&self) {
        self.subscribers.write().clear();
    }

    fn responder_for(&self, subject: &str) -> Option<Responder> {
        self.responders
            .read()
            .iter()
            .find(|(pattern, _)| subject_matches(pattern, subject))
            .map(|(_, responder)| Arc::clone(responder))
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageClient for MemoryBroker {
    fn subscribe(&self, subject: &str) -> Result<Feed<InboundMessage>> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = unbounded();
        self.subscribers.write().insert(
            id,
            Subscriber {
                pattern: subject.to_string(),
                sender,
            },
        );

        let subscribers = Arc::clone(&self.subscribers);
        Ok(Feed::new(receiver).on_cancel(move || {
            subscribers.write().remove(&id);
        }))
    }

    fn publish(&self, subject: &str, data: &[u8], headers: Option<&Headers>) -> Result<()> {
        let message = InboundMessage {
            subject: subject.to_string(),
            data: data.to_vec(),
            headers: headers.cloned(),
        };

        let mut closed = Vec::new();
        {
            let subs = self.subscribers.read();
            for (id, sub) in subs.iter() {
                if subject_matches(&sub.pattern, subject)
                    && sub.sender.send(message.clone()).is_err()
                {
                    closed.push(*id);
                }
            }
        }

        if !closed.is_empty() {
            let mut subs = self.subscribers.write();
            for id in closed {
                subs.remove(&id);
            }
        }
        Ok(())
    }

    fn request(
        &self,
        subject: &str,
        data: &[u8],
        headers: Option<&Headers>,
        timeout: Duration,
    ) -> Result<InboundMessage> {
        let request = InboundMessage {
            subject: subject.to_string(),
            data: data.to_vec(),
            headers: headers.cloned(),
        };

        let Some(responder) = self.responder_for(subject) else {
            thread::sleep(timeout);
            return Err(MonitorError::Timeout { timeout });
        };

        let (reply_tx, reply_rx) = bounded(1);
        thread::spawn(move || match responder(&request) {
            Some(reply) => {
                let _ = reply_tx.send(InboundMessage::new(request.subject, reply));
            }
            // Hold the sender so the requester waits out its timeout.
            None => thread::sleep(timeout),
        });

        match reply_rx.recv_timeout(timeout) {
            Ok(reply) => Ok(reply),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                Err(MonitorError::Timeout { timeout })
            }
        }
    }
}
