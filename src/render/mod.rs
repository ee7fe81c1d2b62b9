//! Event buffering and frame-paced rendering.
//!
//! Events from any number of sources land in a bounded [`EventBuffer`]. A
//! single [`RenderScheduler`] drains it once per display frame:
//! - up to `batch_size` events per drain, oldest first
//! - each batch presented newest first, ahead of earlier batches
//! - immediate re-drain while a backlog remains
//! - rendered items capped, oldest evicted
//!
//! # Example
//!
//! ```ignore
//! let buffer = Arc::new(EventBuffer::new(config.buffer_capacity));
//! let feed = Arc::new(RwLock::new(RenderedFeed::new(config.render_cap)));
//! let sink = |batch: &[RenderedItem]| println!("{} new items", batch.len());
//! let scheduler = RenderScheduler::new(buffer.clone(), feed, Box::new(sink), &config);
//! let handle = scheduler.spawn(IntervalClock::new(config.frame_interval()))?;
//! ```

mod buffer;
mod feed;
mod scheduler;

pub use buffer::{Admission, BufferStats, EventBuffer};
pub use feed::{FeedFilter, RenderedFeed, RenderedItem};
pub use scheduler::{
    FrameClock, FrameTrigger, IntervalClock, ManualClock, RenderScheduler, RenderSink,
    SchedulerHandle,
};
