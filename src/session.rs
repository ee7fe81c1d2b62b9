//! Session context tying all components together.

use crate::client::{KeyValueStore, MessageClient, RangedLog};
use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::history::{ExportBlob, ExportFormat, LogHistoryStore};
use crate::keyset::{KeySetListener, KeySetReconciler};
use crate::range;
use crate::render::{
    BufferStats, EventBuffer, FeedFilter, FrameClock, RenderScheduler, RenderSink, RenderedFeed,
    RenderedItem, SchedulerHandle,
};
use crate::subscriptions::{parse_headers, SubscriptionInfo, SubscriptionRegistry, SubscriptionSummary};
use crate::types::{KvEntry, RangeEntry, RenderEvent, SubscriptionId};
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Backends for one connection.
///
/// Only messaging is required; key-value and ranged-log operations fail with
/// [`MonitorError::NotConnected`] when their backend is absent.
#[derive(Clone)]
pub struct Connection {
    pub messages: Arc<dyn MessageClient>,
    pub kv: Option<Arc<dyn KeyValueStore>>,
    pub log: Option<Arc<dyn RangedLog>>,
}

impl Connection {
    pub fn new(messages: Arc<dyn MessageClient>) -> Self {
        Self {
            messages,
            kv: None,
            log: None,
        }
    }

    pub fn with_kv(mut self, kv: Arc<dyn KeyValueStore>) -> Self {
        self.kv = Some(kv);
        self
    }

    pub fn with_log(mut self, log: Arc<dyn RangedLog>) -> Self {
        self.log = Some(log);
        self
    }
}

type ClockFactory = Box<dyn Fn() -> Box<dyn FrameClock> + Send + Sync>;

/// Sink shared across scheduler restarts.
struct SharedSink(Arc<Mutex<Box<dyn RenderSink>>>);

impl RenderSink for SharedSink {
    fn on_batch(&mut self, batch: &[RenderedItem]) {
        self.0.lock().on_batch(batch);
    }
}

struct Rendering {
    sink: Arc<Mutex<Box<dyn RenderSink>>>,
    clock: ClockFactory,
    handle: Option<SchedulerHandle>,
}

/// One monitoring session.
///
/// Owns the buffer, history, rendered feed, subscription registry and key
/// watch, and resets them across connect/disconnect so no state leaks between
/// connections.
pub struct Session {
    config: MonitorConfig,
    connection: RwLock<Option<Connection>>,
    buffer: Arc<EventBuffer>,
    history: Arc<LogHistoryStore>,
    feed: Arc<RwLock<RenderedFeed>>,
    registry: SubscriptionRegistry,
    keys: KeySetReconciler,
    rendering: Mutex<Option<Rendering>>,
}

impl Session {
    pub fn new(config: MonitorConfig) -> Self {
        let history = Arc::new(LogHistoryStore::new(config.history_capacity));
        let buffer = Arc::new(
            EventBuffer::new(config.buffer_capacity).with_history(Arc::clone(&history)),
        );
        let feed = Arc::new(RwLock::new(RenderedFeed::new(config.render_cap)));
        let registry = SubscriptionRegistry::new(Arc::clone(&buffer), &config);

        Self {
            config,
            connection: RwLock::new(None),
            buffer,
            history,
            feed,
            registry,
            keys: KeySetReconciler::new(),
            rendering: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    // --- Lifecycle ---

    /// Start a fresh session on `connection`, replacing any current one.
    pub fn connect(&self, connection: Connection) -> Result<()> {
        if self.is_connected() {
            self.disconnect();
        }

        self.history.clear();
        self.reset_playback();
        self.registry.attach(Arc::clone(&connection.messages));
        *self.connection.write() = Some(connection);
        self.restart_rendering()?;

        tracing::info!("connected");
        Ok(())
    }

    /// Cancel subscriptions and the watch, stop rendering, drop queued events.
    ///
    /// History is kept so it can still be exported; the next connect resets it.
    pub fn disconnect(&self) {
        let was_connected = self.connection.write().take().is_some();
        self.registry.detach();
        self.keys.reset();
        if let Some(rendering) = self.rendering.lock().as_mut() {
            if let Some(mut handle) = rendering.handle.take() {
                handle.stop();
            }
        }
        self.reset_playback();

        if was_connected {
            tracing::info!("disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.read().is_some()
    }

    fn connection(&self) -> Result<Connection> {
        self.connection
            .read()
            .clone()
            .ok_or(MonitorError::NotConnected)
    }

    fn reset_playback(&self) {
        self.buffer.reset();
        self.feed.write().clear();
    }

    // --- Rendering ---

    /// Drain the buffer into `sink` on frames produced by `clock`.
    ///
    /// `clock` is called again whenever the scheduler restarts (connect, clear).
    /// Rendering only runs while connected.
    pub fn start_rendering<S, F, C>(&self, sink: S, clock: F) -> Result<()>
    where
        S: RenderSink + 'static,
        F: Fn() -> C + Send + Sync + 'static,
        C: FrameClock + 'static,
    {
        let mut rendering = self.rendering.lock();
        if let Some(mut previous) = rendering.take() {
            if let Some(mut handle) = previous.handle.take() {
                handle.stop();
            }
        }
        *rendering = Some(Rendering {
            sink: Arc::new(Mutex::new(Box::new(sink))),
            clock: Box::new(move || Box::new(clock()) as Box<dyn FrameClock>),
            handle: None,
        });
        drop(rendering);

        self.restart_rendering()
    }

    /// Stop the scheduler and forget the sink.
    pub fn stop_rendering(&self) {
        if let Some(mut rendering) = self.rendering.lock().take() {
            if let Some(mut handle) = rendering.handle.take() {
                handle.stop();
            }
        }
    }

    fn restart_rendering(&self) -> Result<()> {
        if !self.is_connected() {
            return Ok(());
        }
        let mut guard = self.rendering.lock();
        let Some(rendering) = guard.as_mut() else {
            return Ok(());
        };
        if let Some(mut handle) = rendering.handle.take() {
            handle.stop();
        }

        let scheduler = RenderScheduler::new(
            Arc::clone(&self.buffer),
            Arc::clone(&self.feed),
            Box::new(SharedSink(Arc::clone(&rendering.sink))),
            &self.config,
        );
        rendering.handle = Some(scheduler.spawn((rendering.clock)())?);
        Ok(())
    }

    /// A scheduler the host drives itself with [`RenderScheduler::drain_tick`].
    ///
    /// Must not be used alongside [`Session::start_rendering`].
    pub fn manual_scheduler(&self, sink: impl RenderSink + 'static) -> RenderScheduler {
        RenderScheduler::new(
            Arc::clone(&self.buffer),
            Arc::clone(&self.feed),
            Box::new(sink),
            &self.config,
        )
    }

    pub fn set_paused(&self, paused: bool) {
        self.buffer.set_paused(paused);
        tracing::debug!(paused, "live display pause toggled");
    }

    pub fn is_paused(&self) -> bool {
        self.buffer.is_paused()
    }

    /// Rendered items, newest first.
    pub fn rendered(&self) -> Vec<RenderedItem> {
        self.feed.read().snapshot()
    }

    /// Rendered items passing `filter`, newest first.
    pub fn visible(&self, filter: &FeedFilter) -> Vec<RenderedItem> {
        self.feed.read().visible(filter)
    }

    pub fn buffer_stats(&self) -> BufferStats {
        self.buffer.stats()
    }

    // --- Messaging ---

    pub fn subscribe(&self, subject: &str) -> Result<SubscriptionInfo> {
        self.registry.subscribe(subject)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> usize {
        self.registry.unsubscribe(id)
    }

    pub fn subscriptions(&self) -> Vec<SubscriptionSummary> {
        self.registry.list()
    }

    /// Publish text with optional headers given as JSON.
    pub fn publish(&self, subject: &str, payload: &str, headers_json: &str) -> Result<()> {
        let headers = parse_headers(headers_json)?;
        self.registry.publish(subject, payload, headers.as_ref())
    }

    /// Send a request and render the reply as an RPC event.
    ///
    /// Uses the configured timeout when `timeout` is `None`.
    pub fn request(
        &self,
        subject: &str,
        payload: &str,
        headers_json: &str,
        timeout: Option<Duration>,
    ) -> Result<RenderEvent> {
        let headers = parse_headers(headers_json)?;
        let timeout = timeout.unwrap_or_else(|| self.config.request_timeout());
        let reply = self
            .registry
            .request_reply(subject, payload, headers.as_ref(), timeout)?;
        self.buffer.push(reply.clone());
        Ok(reply)
    }

    // --- Key-value ---

    fn kv(&self) -> Result<Arc<dyn KeyValueStore>> {
        self.connection()?.kv.ok_or(MonitorError::NotConnected)
    }

    /// Watch the keys of `bucket`, replacing any open watch.
    pub fn open_watch(&self, bucket: &str, listener: Arc<dyn KeySetListener>) -> Result<()> {
        let kv = self.kv()?;
        self.keys.open(kv.as_ref(), bucket, listener)
    }

    /// Stop watching, keeping the last known keys.
    pub fn close_watch(&self) -> bool {
        self.keys.close()
    }

    pub fn watched_keys(&self) -> Vec<String> {
        self.keys.keys()
    }

    pub fn key_set(&self) -> &KeySetReconciler {
        &self.keys
    }

    pub fn kv_get(&self, bucket: &str, key: &str) -> Result<Option<KvEntry>> {
        self.kv()?.get(bucket, key)
    }

    pub fn kv_put(&self, bucket: &str, key: &str, value: &str) -> Result<u64> {
        if key.is_empty() {
            return Err(MonitorError::InvalidInput("key is empty".to_string()));
        }
        self.kv()?.put(bucket, key, value.as_bytes())
    }

    pub fn kv_delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.kv()?.delete(bucket, key)
    }

    pub fn kv_history(&self, bucket: &str, key: &str) -> Result<Vec<KvEntry>> {
        self.kv()?.history(bucket, key)
    }

    // --- Ranged log ---

    /// Read `start..=end` from `stream`, newest first, skipping missing entries.
    ///
    /// Windows wider than the configured limit are rejected, not truncated.
    pub fn fetch_range(&self, stream: &str, start: u64, end: u64) -> Result<Vec<RangeEntry>> {
        let log = self.connection()?.log.ok_or(MonitorError::NotConnected)?;
        range::validate_window(start, end, self.config.max_range_width)?;
        Ok(range::fetch_range(log.as_ref(), stream, start, end))
    }

    // --- History ---

    pub fn export_history(&self) -> Result<ExportBlob> {
        self.history.export()
    }

    pub fn export_history_as(&self, format: ExportFormat) -> Result<ExportBlob> {
        self.history.export_as(format)
    }

    pub fn export_history_to(&self, dir: impl AsRef<Path>, format: ExportFormat) -> Result<PathBuf> {
        self.history.export_to_path(dir, format)
    }

    pub fn history(&self) -> &LogHistoryStore {
        &self.history
    }

    /// Empty history and restart playback from a fresh baseline.
    pub fn clear_logs(&self) -> Result<()> {
        if let Some(rendering) = self.rendering.lock().as_mut() {
            if let Some(mut handle) = rendering.handle.take() {
                handle.stop();
            }
        }
        self.history.clear();
        self.reset_playback();
        self.restart_rendering()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_rendering();
        self.registry.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyset::NoopListener;
    use crate::memory::{MemoryBroker, MemoryKv, MemoryStreamLog};
    use crate::render::ManualClock;
    use std::thread;
    use std::time::Instant;

    fn connected() -> (Session, Arc<MemoryBroker>) {
        let session = Session::new(MonitorConfig::default());
        let broker = Arc::new(MemoryBroker::new());
        session.connect(Connection::new(broker.clone())).unwrap();
        (session, broker)
    }

    fn wait_until(cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !cond() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_not_connected_errors() {
        let session = Session::new(MonitorConfig::default());
        assert!(matches!(session.subscribe("a"), Err(MonitorError::NotConnected)));
        assert!(matches!(session.fetch_range("s", 1, 2), Err(MonitorError::NotConnected)));
        assert!(matches!(session.kv_get("b", "k"), Err(MonitorError::NotConnected)));
    }

    #[test]
    fn test_missing_backend_is_not_connected() {
        let (session, _) = connected();
        assert!(matches!(
            session.open_watch("cfg", Arc::new(NoopListener)),
            Err(MonitorError::NotConnected)
        ));
    }

    #[test]
    fn test_manual_scheduler_renders_subscription_traffic() {
        let (session, broker) = connected();
        session.subscribe("orders.*").unwrap();
        broker.publish("orders.new", br#"{"id":1}"#, None).unwrap();
        broker.publish("orders.new", b"{broken", None).unwrap();
        wait_until(|| session.buffer_stats().queued == 2);

        let mut scheduler = session.manual_scheduler(|_: &[RenderedItem]| {});
        assert_eq!(scheduler.drain_tick(), 2);

        let rendered = session.rendered();
        assert_eq!(rendered[0].body, "{broken");
        assert!(rendered[1].structured);
        assert_eq!(session.history().len(), 2);
    }

    #[test]
    fn test_request_is_rendered_as_rpc() {
        let (session, broker) = connected();
        broker.respond("svc.echo", |req| Some(req.data.clone()));

        let reply = session
            .request("svc.echo", "hi", r#"{"x":"1"}"#, Some(Duration::from_millis(500)))
            .unwrap();
        assert_eq!(reply.payload, "hi");
        assert_eq!(session.buffer_stats().queued, 1);
    }

    #[test]
    fn test_request_with_bad_headers() {
        let (session, _) = connected();
        let err = session.request("svc", "", "{oops", None).unwrap_err();
        assert!(matches!(err, MonitorError::InvalidInput(_)));
    }

    #[test]
    fn test_range_width_rejected_by_caller() {
        let session = Session::new(MonitorConfig::default());
        let log = Arc::new(MemoryStreamLog::new());
        for _ in 0..100 {
            log.append("s", "x", b"");
        }
        session
            .connect(Connection::new(Arc::new(MemoryBroker::new())).with_log(log.clone()))
            .unwrap();

        assert!(matches!(
            session.fetch_range("s", 1, 51),
            Err(MonitorError::InvalidInput(_))
        ));
        assert_eq!(log.read_count(), 0);
        assert_eq!(session.fetch_range("s", 51, 100).unwrap().len(), 50);
    }

    #[test]
    fn test_disconnect_resets_buffer_keeps_history() {
        let kv = Arc::new(MemoryKv::new());
        kv.put("cfg", "a", b"1").unwrap();
        let session = Session::new(MonitorConfig::default());
        let broker = Arc::new(MemoryBroker::new());
        session
            .connect(Connection::new(broker.clone()).with_kv(kv.clone()))
            .unwrap();
        session.subscribe("a").unwrap();
        session.open_watch("cfg", Arc::new(NoopListener)).unwrap();
        broker.publish("a", b"1", None).unwrap();
        wait_until(|| session.buffer_stats().queued == 1);

        session.disconnect();
        assert!(!session.is_connected());
        assert!(session.subscriptions().is_empty());
        assert_eq!(broker.subscriber_count(), 0);
        assert_eq!(kv.watcher_count("cfg"), 0);
        assert_eq!(session.buffer_stats().queued, 0);
        assert!(session.export_history().is_ok());

        session.connect(Connection::new(broker)).unwrap();
        assert!(matches!(session.export_history(), Err(MonitorError::EmptyHistory)));
    }

    #[test]
    fn test_clear_logs_restarts_from_baseline() {
        let (session, _) = connected();
        let (clock, trigger) = ManualClock::new();
        session
            .start_rendering(|_: &[RenderedItem]| {}, move || clock.clone())
            .unwrap();

        session.request("nobody", "", "", Some(Duration::from_millis(1))).ok();
        session.buffer.push(RenderEvent::message("a", "1"));
        trigger.frame();
        wait_until(|| session.rendered().len() == 1);
        assert_eq!(session.rendered().len(), 1);

        session.set_paused(true);
        session.clear_logs().unwrap();
        assert!(session.rendered().is_empty());
        assert!(session.history().is_empty());
        assert!(!session.is_paused());

        session.buffer.push(RenderEvent::message("b", "2"));
        trigger.frame();
        wait_until(|| session.rendered().len() == 1);
        assert_eq!(session.rendered()[0].id, 1);
    }
}
