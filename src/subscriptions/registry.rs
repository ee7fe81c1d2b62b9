//! Registry of live subscriptions feeding the event buffer.

use crate::client::{Feed, MessageClient};
use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::payload;
use crate::render::EventBuffer;
use crate::types::{EventKind, Headers, InboundMessage, RenderEvent, SubscriptionId, Timestamp};
use crossbeam_channel::{bounded, select, Receiver, Sender, TryRecvError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::types::{validate_subject, EndReason, SubscriptionInfo, SubscriptionSummary};

/// Normalize an inbound message into a live render event.
pub fn normalize(message: InboundMessage, kind: EventKind) -> RenderEvent {
    RenderEvent {
        payload: payload::decode(&message.data),
        subject: message.subject,
        kind,
        headers: message.headers.filter(|h| !h.is_empty()),
        received_at: Timestamp::now(),
    }
}

/// Internal subscription state.
struct Subscription {
    subject: String,
    /// Dropping this ends the forwarding task.
    stop: Sender<()>,
    thread: JoinHandle<EndReason>,
    forwarded: Arc<AtomicU64>,
}

impl Subscription {
    /// Signal the forwarding task and wait for it to exit.
    fn cancel(self, id: SubscriptionId) {
        drop(self.stop);
        match self.thread.join() {
            Ok(reason) => tracing::debug!(%id, subject = %self.subject, ?reason, "subscription ended"),
            Err(_) => tracing::warn!(%id, "subscription forwarding task panicked"),
        }
    }
}

/// Forward one feed into the buffer until cancelled or the feed closes.
fn forward(
    id: SubscriptionId,
    mut feed: Feed<InboundMessage>,
    stop: Receiver<()>,
    buffer: Arc<EventBuffer>,
    forwarded: Arc<AtomicU64>,
) -> EndReason {
    let reason = loop {
        // A pending stop wins over pending messages.
        if !matches!(stop.try_recv(), Err(TryRecvError::Empty)) {
            break EndReason::Cancelled;
        }
        select! {
            recv(feed.receiver) -> message => match message {
                Ok(message) => {
                    forwarded.fetch_add(1, Ordering::Relaxed);
                    buffer.push(normalize(message, EventKind::Msg));
                }
                Err(_) => {
                    tracing::warn!(%id, "subscription feed closed by backend");
                    break EndReason::FeedClosed;
                }
            },
            recv(stop) -> _ => break EndReason::Cancelled,
        }
    };
    feed.cancel();
    reason
}

/// Tracks active subscriptions and runs one forwarding task per subscription.
///
/// All tasks push into the same [`EventBuffer`]. Order is preserved within a
/// subscription, not across subscriptions.
pub struct SubscriptionRegistry {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Current connection, if any.
    connection: RwLock<Option<Arc<dyn MessageClient>>>,
    buffer: Arc<EventBuffer>,
    /// Counter for generating subscription IDs. Never reset.
    next_id: AtomicU64,
    max_subscriptions: Option<usize>,
}

impl SubscriptionRegistry {
    pub fn new(buffer: Arc<EventBuffer>, config: &MonitorConfig) -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            connection: RwLock::new(None),
            buffer,
            next_id: AtomicU64::new(1),
            max_subscriptions: config.max_subscriptions,
        }
    }

    /// Use `client` for subsequent operations.
    pub fn attach(&self, client: Arc<dyn MessageClient>) {
        *self.connection.write() = Some(client);
    }

    /// Cancel everything and forget the connection.
    pub fn detach(&self) {
        self.clear();
        *self.connection.write() = None;
    }

    pub fn is_connected(&self) -> bool {
        self.connection.read().is_some()
    }

    fn client(&self) -> Result<Arc<dyn MessageClient>> {
        self.connection
            .read()
            .as_ref()
            .map(Arc::clone)
            .ok_or(MonitorError::NotConnected)
    }

    /// Open a subscription and start forwarding its messages.
    pub fn subscribe(&self, subject: &str) -> Result<SubscriptionInfo> {
        let client = self.client()?;
        validate_subject(subject)?;

        let mut subs = self.subscriptions.write();
        if let Some(max) = self.max_subscriptions {
            if subs.len() >= max {
                return Err(MonitorError::SubscriptionLimit(subs.len()));
            }
        }

        let feed = client.subscribe(subject)?;
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (stop_tx, stop_rx) = bounded(1);
        let forwarded = Arc::new(AtomicU64::new(0));

        let buffer = Arc::clone(&self.buffer);
        let counter = Arc::clone(&forwarded);
        let thread = thread::Builder::new()
            .name(format!("subscription-{}", id))
            .spawn(move || forward(id, feed, stop_rx, buffer, counter))?;

        subs.insert(
            id,
            Subscription {
                subject: subject.to_string(),
                stop: stop_tx,
                thread,
                forwarded,
            },
        );
        tracing::info!(%id, subject, count = subs.len(), "subscribed");

        Ok(SubscriptionInfo {
            id,
            subject: subject.to_string(),
            count: subs.len(),
        })
    }

    /// Cancel a subscription. Unknown ids are a no-op.
    ///
    /// Returns the number of active subscriptions afterwards.
    pub fn unsubscribe(&self, id: SubscriptionId) -> usize {
        let (removed, count) = {
            let mut subs = self.subscriptions.write();
            let removed = subs.remove(&id);
            (removed, subs.len())
        };

        match removed {
            Some(sub) => {
                sub.cancel(id);
                tracing::info!(%id, count, "unsubscribed");
            }
            None => tracing::debug!(%id, "unsubscribe for unknown id ignored"),
        }
        count
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Active subscriptions ordered by id.
    pub fn list(&self) -> Vec<SubscriptionSummary> {
        let mut list: Vec<SubscriptionSummary> = self
            .subscriptions
            .read()
            .iter()
            .map(|(id, sub)| SubscriptionSummary {
                id: *id,
                subject: sub.subject.clone(),
                forwarded: sub.forwarded.load(Ordering::Relaxed),
            })
            .collect();
        list.sort_by_key(|s| s.id);
        list
    }

    /// Cancel every subscription. Ids keep increasing afterwards.
    pub fn clear(&self) {
        let drained: Vec<(SubscriptionId, Subscription)> =
            self.subscriptions.write().drain().collect();
        let n = drained.len();
        for (id, sub) in drained {
            sub.cancel(id);
        }
        if n > 0 {
            tracing::info!(cancelled = n, "subscription registry cleared");
        }
    }

    pub fn publish(&self, subject: &str, payload: &str, headers: Option<&Headers>) -> Result<()> {
        let client = self.client()?;
        validate_subject(subject)?;
        client.publish(subject, payload.as_bytes(), headers)
    }

    /// One-shot request. The reply is returned, not pushed to the buffer.
    pub fn request_reply(
        &self,
        subject: &str,
        payload: &str,
        headers: Option<&Headers>,
        timeout: Duration,
    ) -> Result<RenderEvent> {
        let client = self.client()?;
        validate_subject(subject)?;

        match client.request(subject, payload.as_bytes(), headers, timeout) {
            Ok(reply) => Ok(normalize(reply, EventKind::Rpc)),
            Err(MonitorError::Timeout { .. }) => {
                tracing::debug!(subject, timeout_ms = timeout.as_millis() as u64, "request timed out");
                Err(MonitorError::Timeout { timeout })
            }
            Err(e) => Err(e),
        }
    }
}

impl Drop for SubscriptionRegistry {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBroker;
    use std::time::Instant;

    fn registry() -> (SubscriptionRegistry, Arc<EventBuffer>, Arc<MemoryBroker>) {
        let buffer = Arc::new(EventBuffer::new(100));
        let registry = SubscriptionRegistry::new(Arc::clone(&buffer), &MonitorConfig::default());
        let broker = Arc::new(MemoryBroker::new());
        registry.attach(broker.clone());
        (registry, buffer, broker)
    }

    fn wait_for_len(buffer: &EventBuffer, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while buffer.len() < n && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let (registry, _, broker) = registry();

        let info = registry.subscribe("a.>").unwrap();
        assert_eq!(info.count, 1);
        assert_eq!(broker.subscriber_count(), 1);

        assert_eq!(registry.unsubscribe(info.id), 0);
        assert_eq!(broker.subscriber_count(), 0);
    }

    #[test]
    fn test_subscribe_without_connection() {
        let buffer = Arc::new(EventBuffer::new(10));
        let registry = SubscriptionRegistry::new(buffer, &MonitorConfig::default());
        assert!(matches!(registry.subscribe("a"), Err(MonitorError::NotConnected)));
    }

    #[test]
    fn test_unknown_unsubscribe_is_noop() {
        let (registry, _, _) = registry();
        registry.subscribe("a").unwrap();
        assert_eq!(registry.unsubscribe(SubscriptionId(999)), 1);
    }

    #[test]
    fn test_forwarding_preserves_order_and_decodes() {
        let (registry, buffer, broker) = registry();
        registry.subscribe("a").unwrap();

        broker.publish("a", b"1", None).unwrap();
        broker.publish("a", &[0xff, 0x00], None).unwrap();
        broker.publish("a", b"3", None).unwrap();
        wait_for_len(&buffer, 3);

        let payloads: Vec<String> = buffer.drain(10).into_iter().map(|e| e.payload).collect();
        assert_eq!(payloads, vec!["1", "[Binary Data: 2 bytes]", "3"]);
    }

    #[test]
    fn test_no_pushes_after_unsubscribe() {
        let (registry, buffer, broker) = registry();
        let info = registry.subscribe("a").unwrap();
        registry.unsubscribe(info.id);

        broker.publish("a", b"late", None).unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_ids_are_monotonic_across_clear() {
        let (registry, _, _) = registry();
        let first = registry.subscribe("a").unwrap();
        registry.clear();
        assert_eq!(registry.subscription_count(), 0);

        let second = registry.subscribe("a").unwrap();
        assert!(second.id > first.id);
    }

    #[test]
    fn test_subscription_limit() {
        let buffer = Arc::new(EventBuffer::new(10));
        let config = MonitorConfig {
            max_subscriptions: Some(1),
            ..Default::default()
        };
        let registry = SubscriptionRegistry::new(buffer, &config);
        registry.attach(Arc::new(MemoryBroker::new()));

        registry.subscribe("a").unwrap();
        assert!(matches!(
            registry.subscribe("b"),
            Err(MonitorError::SubscriptionLimit(1))
        ));
    }

    #[test]
    fn test_feed_closed_by_backend_stops_quietly() {
        let (registry, buffer, broker) = registry();
        registry.subscribe("a").unwrap();
        broker.disconnect();

        // The task exits on its own; clearing afterwards must not block or fail.
        thread::sleep(Duration::from_millis(20));
        registry.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_request_reply_is_rpc_and_not_buffered() {
        let (registry, buffer, broker) = registry();
        broker.respond("svc.echo", |req| Some(req.data.clone()));

        let event = registry
            .request_reply("svc.echo", "ping", None, Duration::from_millis(500))
            .unwrap();
        assert_eq!(event.kind, EventKind::Rpc);
        assert_eq!(event.payload, "ping");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_request_timeout_names_timeout() {
        let (registry, _, _) = registry();
        let err = registry
            .request_reply("nobody", "", None, Duration::from_millis(25))
            .unwrap_err();
        match err {
            MonitorError::Timeout { timeout } => assert_eq!(timeout, Duration::from_millis(25)),
            other => panic!("Expected Timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_list_reports_forwarded() {
        let (registry, buffer, broker) = registry();
        let a = registry.subscribe("a").unwrap();
        registry.subscribe("b").unwrap();

        broker.publish("a", b"x", None).unwrap();
        wait_for_len(&buffer, 1);

        let list = registry.list();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, a.id);
        assert_eq!(list[0].forwarded, 1);
        assert_eq!(list[1].forwarded, 0);
    }
}
