//! End-to-end tests for the monitoring pipeline on the in-process backend.

use busview::{
    Connection, EventKind, ExportFormat, FeedFilter, HistoryEntry, KeySetListener, KeyValueStore,
    ManualClock, MemoryBroker, MemoryKv, MemoryStreamLog, MessageClient, MonitorConfig,
    RenderedItem, Session, WatchStatus,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn wait_until(cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(3);
    while !cond() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(2));
    }
}

struct Harness {
    session: Session,
    broker: Arc<MemoryBroker>,
    kv: Arc<MemoryKv>,
    log: Arc<MemoryStreamLog>,
    batches: Arc<Mutex<Vec<Vec<u64>>>>,
    trigger: busview::FrameTrigger,
}

fn harness(config: MonitorConfig) -> Harness {
    init_tracing();
    let session = Session::new(config);
    let broker = Arc::new(MemoryBroker::new());
    let kv = Arc::new(MemoryKv::new());
    let log = Arc::new(MemoryStreamLog::new());
    session
        .connect(
            Connection::new(broker.clone())
                .with_kv(kv.clone())
                .with_log(log.clone()),
        )
        .unwrap();

    let batches = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&batches);
    let (clock, trigger) = ManualClock::new();
    session
        .start_rendering(
            move |batch: &[RenderedItem]| seen.lock().push(batch.iter().map(|i| i.id).collect()),
            move || clock.clone(),
        )
        .unwrap();

    Harness {
        session,
        broker,
        kv,
        log,
        batches,
        trigger,
    }
}

// --- Live Traffic ---

#[test]
fn test_two_subscriptions_fan_in_to_one_feed() {
    let h = harness(MonitorConfig::default());
    let orders = h.session.subscribe("orders.>").unwrap();
    let audit = h.session.subscribe("audit").unwrap();
    assert_ne!(orders.id, audit.id);

    h.broker.publish("orders.eu.new", br#"{"id":1}"#, None).unwrap();
    h.broker.publish("audit", b"login", None).unwrap();
    h.broker.publish("ignored", b"x", None).unwrap();
    wait_until(|| h.session.buffer_stats().queued == 2);

    h.trigger.frame();
    wait_until(|| h.session.rendered().len() == 2);

    let rendered = h.session.rendered();
    assert_eq!(rendered.len(), 2);
    assert!(rendered.iter().all(|i| i.kind == EventKind::Msg));
    assert_eq!(h.batches.lock().len(), 1);

    let summaries = h.session.subscriptions();
    let total: u64 = summaries.iter().map(|s| s.forwarded).sum();
    assert_eq!(total, 2);
}

#[test]
fn test_batches_render_newest_first() {
    let h = harness(MonitorConfig {
        batch_size: 3,
        ..Default::default()
    });
    h.session.subscribe("seq").unwrap();
    for i in 1..=5 {
        h.broker.publish("seq", i.to_string().as_bytes(), None).unwrap();
    }
    wait_until(|| h.session.buffer_stats().queued == 5);

    h.trigger.frame();
    wait_until(|| h.session.rendered().len() == 5);

    let bodies: Vec<String> = h.session.rendered().into_iter().map(|i| i.body).collect();
    assert_eq!(bodies, vec!["5", "4", "3", "2", "1"]);
    assert_eq!(*h.batches.lock(), vec![vec![3, 2, 1], vec![5, 4]]);
}

#[test]
fn test_render_cap_evicts_oldest() {
    let h = harness(MonitorConfig {
        render_cap: 3,
        ..Default::default()
    });
    h.session.subscribe("seq").unwrap();
    for i in 1..=7 {
        h.broker.publish("seq", i.to_string().as_bytes(), None).unwrap();
    }
    wait_until(|| h.session.buffer_stats().queued == 7);
    h.trigger.frame();
    wait_until(|| h.session.buffer_stats().queued == 0 && h.batches.lock().len() == 1);

    let bodies: Vec<String> = h.session.rendered().into_iter().map(|i| i.body).collect();
    assert_eq!(bodies, vec!["7", "6", "5"]);
    assert_eq!(h.session.history().len(), 7);
}

#[test]
fn test_paused_traffic_is_not_rendered_or_recorded() {
    let h = harness(MonitorConfig::default());
    let sub = h.session.subscribe("t").unwrap();

    h.session.set_paused(true);
    h.broker.publish("t", b"hidden", None).unwrap();
    wait_until(|| h.session.buffer_stats().dropped_while_paused == 1);

    h.session.set_paused(false);
    h.broker.publish("t", b"shown", None).unwrap();
    wait_until(|| h.session.buffer_stats().queued == 1);
    h.trigger.frame();
    wait_until(|| h.session.rendered().len() == 1);

    assert_eq!(h.session.rendered()[0].body, "shown");
    assert_eq!(h.session.history().len(), 1);
    let forwarded = h.session.subscriptions()[0].forwarded;
    assert_eq!(forwarded, 2);
    assert_eq!(h.session.unsubscribe(sub.id), 0);
}

#[test]
fn test_unsubscribe_stops_forwarding() {
    let h = harness(MonitorConfig::default());
    let sub = h.session.subscribe("t").unwrap();
    assert_eq!(h.broker.subscriber_count(), 1);

    assert_eq!(h.session.unsubscribe(sub.id), 0);
    assert_eq!(h.broker.subscriber_count(), 0);

    h.broker.publish("t", b"late", None).unwrap();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(h.session.buffer_stats().queued, 0);
}

#[test]
fn test_filter_and_large_payload() {
    let h = harness(MonitorConfig {
        large_payload_threshold: 50,
        ..Default::default()
    });
    h.session.subscribe(">").unwrap();
    h.broker.publish("big", "x".repeat(80).as_bytes(), None).unwrap();
    h.broker.publish("small", b"Hello", None).unwrap();
    wait_until(|| h.session.buffer_stats().queued == 2);
    h.trigger.frame();
    wait_until(|| h.session.rendered().len() == 2);

    let hits = h.session.visible(&FeedFilter::text("hello"));
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].subject, "small");

    let big = h.session.visible(&FeedFilter::text("big"));
    assert_eq!(big[0].truncated_from, Some(80));
    assert!(big[0].body.ends_with("... [truncated, 80 chars total]"));
}

// --- Request / Reply ---

#[test]
fn test_request_reply_enters_feed_as_rpc() {
    let h = harness(MonitorConfig::default());
    h.broker.respond("svc.time", |_| Some(br#"{"now":1}"#.to_vec()));

    let reply = h
        .session
        .request("svc.time", "", r#"{"trace":"abc"}"#, None)
        .unwrap();
    assert_eq!(reply.kind, EventKind::Rpc);

    h.trigger.frame();
    wait_until(|| h.session.rendered().len() == 1);
    let item = &h.session.rendered()[0];
    assert_eq!(item.kind, EventKind::Rpc);
    assert!(item.structured);
}

#[test]
fn test_publish_delivers_headers() {
    let h = harness(MonitorConfig::default());
    let outbox = h.broker.subscribe("out").unwrap();

    h.session
        .publish("out", "payload", r#"{"X-Trace":["a","b"]}"#)
        .unwrap();

    let message = outbox.receiver.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(message.data, b"payload");
    let headers = message.headers.unwrap();
    assert_eq!(headers.get_all("X-Trace").collect::<Vec<_>>(), vec!["a", "b"]);
}

// --- Key Inventory ---

#[derive(Default)]
struct Inventory {
    added: Mutex<Vec<String>>,
    removed: Mutex<Vec<String>>,
    statuses: Mutex<Vec<WatchStatus>>,
}

impl KeySetListener for Inventory {
    fn on_key_added(&self, key: &str) {
        self.added.lock().push(key.to_string());
    }
    fn on_key_removed(&self, key: &str) {
        self.removed.lock().push(key.to_string());
    }
    fn on_watch_status(&self, _target: &str, status: WatchStatus) {
        self.statuses.lock().push(status);
    }
}

#[test]
fn test_watch_reconciles_keys() {
    let h = harness(MonitorConfig::default());
    h.kv.put("cfg", "a", b"1").unwrap();
    h.kv.put("cfg", "b", b"2").unwrap();

    let inventory = Arc::new(Inventory::default());
    h.session.open_watch("cfg", inventory.clone()).unwrap();
    wait_until(|| h.session.watched_keys().len() == 2);

    h.session.kv_put("cfg", "c", "3").unwrap();
    h.session.kv_put("cfg", "a", "updated").unwrap();
    h.session.kv_delete("cfg", "b").unwrap();
    wait_until(|| h.session.watched_keys() == vec!["a".to_string(), "c".to_string()]);

    assert_eq!(h.session.watched_keys(), vec!["a", "c"]);
    assert_eq!(inventory.added.lock().len(), 3);
    assert_eq!(*inventory.removed.lock(), vec!["b"]);

    let history = h.session.kv_history("cfg", "a").unwrap();
    assert_eq!(history.len(), 2);
    let current = h.session.kv_get("cfg", "a").unwrap().unwrap();
    assert_eq!(current.value, b"updated");

    assert!(h.session.close_watch());
    assert_eq!(*inventory.statuses.lock(), vec![WatchStatus::Opened, WatchStatus::Closed]);
    assert!(h.session.key_set().contains("a"));
}

// --- Ranged Reads ---

#[test]
fn test_range_with_purged_gap() {
    let h = harness(MonitorConfig::default());
    for i in 1..=160u64 {
        h.log.append("ORDERS", "orders.new", i.to_string().as_bytes());
    }
    h.log.purge("ORDERS", 120..=125);

    let entries = h.session.fetch_range("ORDERS", 100, 149).unwrap();
    assert_eq!(entries.len(), 44);
    assert_eq!(entries[0].seq, 149);
    assert_eq!(entries.last().unwrap().seq, 100);
    assert!(entries.windows(2).all(|w| w[0].seq > w[1].seq));
}

// --- History Export ---

#[test]
fn test_export_json_and_msgpack() {
    let h = harness(MonitorConfig::default());
    h.session.subscribe("t").unwrap();
    h.broker.publish("t", br#"{"a":1}"#, None).unwrap();
    h.broker.publish("t", b"plain", None).unwrap();
    wait_until(|| h.session.history().len() == 2);

    let blob = h.session.export_history().unwrap();
    assert!(blob.file_name.starts_with("monitor-logs-"));
    assert!(blob.file_name.ends_with(".json"));
    let entries: Vec<HistoryEntry> = serde_json::from_slice(&blob.bytes).unwrap();
    assert_eq!(entries[0].payload, serde_json::json!({"a": 1}));
    assert_eq!(entries[1].payload, serde_json::json!("plain"));

    let packed = h.session.export_history_as(ExportFormat::MessagePack).unwrap();
    let decoded: Vec<HistoryEntry> = rmp_serde::from_slice(&packed.bytes).unwrap();
    assert_eq!(decoded, entries);

    let dir = tempfile::TempDir::new().unwrap();
    let path = h.session.export_history_to(dir.path(), ExportFormat::Json).unwrap();
    assert_eq!(std::fs::read(path).unwrap(), blob.bytes);
}

#[test]
fn test_reconnect_starts_clean() {
    let h = harness(MonitorConfig::default());
    h.session.subscribe("t").unwrap();
    h.broker.publish("t", b"1", None).unwrap();
    wait_until(|| h.session.history().len() == 1);
    h.trigger.frame();
    wait_until(|| h.session.rendered().len() == 1);

    h.session.disconnect();
    assert!(h.session.rendered().is_empty());
    assert_eq!(h.session.history().len(), 1);

    h.session.connect(Connection::new(h.broker.clone())).unwrap();
    assert!(h.session.history().is_empty());
    assert!(h.session.subscriptions().is_empty());

    h.session.subscribe("t").unwrap();
    h.broker.publish("t", b"2", None).unwrap();
    wait_until(|| h.session.buffer_stats().queued == 1);
    h.trigger.frame();
    wait_until(|| h.session.rendered().len() == 1);
    assert_eq!(h.session.rendered()[0].id, 1);
}
