//! # Bus View
//!
//! Event ingestion and rendering core for a live message-bus and key-value
//! traffic monitor.
//!
//! ## Core Concepts
//!
//! - **Buffer**: One bounded queue fed by every subscription and request reply
//! - **Scheduler**: Drains the buffer per display frame in newest-first batches
//! - **Subscriptions**: Cancellable forwarding tasks keyed by a stable id
//! - **Key sets**: Idempotent reconciliation of a watched bucket's keys
//! - **Ranges**: Gap-tolerant concurrent reads from a sequence-numbered log
//! - **History**: Bounded export log of everything admitted for display
//!
//! ## Example
//!
//! ```ignore
//! use busview::{Connection, IntervalClock, MonitorConfig, RenderedItem, Session};
//!
//! let session = Session::new(MonitorConfig::default());
//! session.connect(Connection::new(client))?;
//!
//! let interval = session.config().frame_interval();
//! session.start_rendering(
//!     |batch: &[RenderedItem]| println!("{} new events", batch.len()),
//!     move || IntervalClock::new(interval),
//! )?;
//!
//! let sub = session.subscribe("orders.>")?;
//! session.request("svc.time", "", "", None)?;
//!
//! session.unsubscribe(sub.id);
//! let blob = session.export_history()?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod history;
pub mod keyset;
pub mod memory;
pub mod payload;
pub mod range;
pub mod render;
pub mod session;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use client::{Feed, KeyValueStore, MessageClient, RangedLog};
pub use config::MonitorConfig;
pub use error::{MonitorError, Result};
pub use history::{ExportBlob, ExportFormat, HistoryEntry, LogHistoryStore};
pub use keyset::{KeyEvent, KeySet, KeySetListener, KeySetReconciler, NoopListener, WatchStatus};
pub use memory::{MemoryBroker, MemoryKv, MemoryStreamLog};
pub use range::{fetch_range, validate_window, Slot};
pub use render::{
    Admission, BufferStats, EventBuffer, FeedFilter, FrameClock, FrameTrigger, IntervalClock,
    ManualClock, RenderScheduler, RenderSink, RenderedFeed, RenderedItem, SchedulerHandle,
};
pub use session::{Connection, Session};
pub use subscriptions::{
    normalize, parse_headers, validate_subject, EndReason, SubscriptionInfo, SubscriptionRegistry,
    SubscriptionSummary,
};
pub use types::{
    EventKind, Headers, InboundMessage, KeyChange, KeyOperation, KvEntry, RangeEntry, RenderEvent,
    StreamEntry, SubscriptionId, Timestamp,
};
