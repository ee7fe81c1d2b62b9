//! Frame-paced draining of the event buffer.

use super::buffer::EventBuffer;
use super::feed::{RenderedFeed, RenderedItem};
use crate::config::MonitorConfig;
use crate::error::Result;
use crossbeam_channel::{bounded, select, tick, unbounded, Receiver, Sender, TryRecvError};
use parking_lot::RwLock;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Receives each drained batch, newest event first.
pub trait RenderSink: Send {
    fn on_batch(&mut self, batch: &[RenderedItem]);
}

impl<F> RenderSink for F
where
    F: FnMut(&[RenderedItem]) + Send,
{
    fn on_batch(&mut self, batch: &[RenderedItem]) {
        self(batch)
    }
}

/// Source of display frames.
pub trait FrameClock: Send {
    /// Block until the next frame. Returns false once `stop` fires.
    fn wait_frame(&mut self, stop: &Receiver<()>) -> bool;
}

impl FrameClock for Box<dyn FrameClock> {
    fn wait_frame(&mut self, stop: &Receiver<()>) -> bool {
        (**self).wait_frame(stop)
    }
}

/// Frames at a fixed interval.
pub struct IntervalClock {
    ticker: Receiver<Instant>,
}

impl IntervalClock {
    pub fn new(interval: Duration) -> Self {
        Self {
            ticker: tick(interval),
        }
    }
}

impl FrameClock for IntervalClock {
    fn wait_frame(&mut self, stop: &Receiver<()>) -> bool {
        select! {
            recv(self.ticker) -> _ => true,
            recv(stop) -> _ => false,
        }
    }
}

/// Frames triggered by the host, e.g. from its own paint callback.
///
/// Clones share the same trigger; only one should be waiting at a time.
#[derive(Clone)]
pub struct ManualClock {
    frames: Receiver<()>,
}

/// Handle used to trigger frames on a [`ManualClock`].
#[derive(Clone)]
pub struct FrameTrigger {
    frames: Sender<()>,
}

impl ManualClock {
    pub fn new() -> (Self, FrameTrigger) {
        let (frames_tx, frames_rx) = unbounded();
        (Self { frames: frames_rx }, FrameTrigger { frames: frames_tx })
    }
}

impl FrameTrigger {
    /// Request one frame. Returns false if the clock is gone.
    pub fn frame(&self) -> bool {
        self.frames.send(()).is_ok()
    }
}

impl FrameClock for ManualClock {
    fn wait_frame(&mut self, stop: &Receiver<()>) -> bool {
        select! {
            recv(self.frames) -> frame => frame.is_ok(),
            recv(stop) -> _ => false,
        }
    }
}

/// Drains the buffer in batches and hands them to the presentation layer.
///
/// `drain_tick` takes `&mut self`, so only one drain can ever be in flight.
pub struct RenderScheduler {
    buffer: Arc<EventBuffer>,
    feed: Arc<RwLock<RenderedFeed>>,
    sink: Box<dyn RenderSink>,
    batch_size: usize,
    large_payload_threshold: usize,
    next_item_id: u64,
}

impl RenderScheduler {
    pub fn new(
        buffer: Arc<EventBuffer>,
        feed: Arc<RwLock<RenderedFeed>>,
        sink: Box<dyn RenderSink>,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            buffer,
            feed,
            sink,
            batch_size: config.batch_size.max(1),
            large_payload_threshold: config.large_payload_threshold,
            next_item_id: 1,
        }
    }

    /// Drain one batch: render oldest-first, present newest-first.
    ///
    /// Returns the number of events drained.
    pub fn drain_tick(&mut self) -> usize {
        let events = self.buffer.drain(self.batch_size);
        if events.is_empty() {
            return 0;
        }

        let mut batch: Vec<RenderedItem> = events
            .into_iter()
            .map(|event| {
                let id = self.next_item_id;
                self.next_item_id += 1;
                RenderedItem::render(id, event, self.large_payload_threshold)
            })
            .collect();
        batch.reverse();

        let evicted = self.feed.write().insert_batch(&batch);
        if evicted > 0 {
            tracing::trace!(evicted, "evicted rendered items over cap");
        }
        self.sink.on_batch(&batch);
        batch.len()
    }

    /// Run until `stop` fires.
    ///
    /// Each frame drains once; while the buffer stays non-empty it drains
    /// again immediately instead of waiting for the next frame.
    pub fn run(mut self, mut clock: impl FrameClock, stop: Receiver<()>) {
        'frames: while clock.wait_frame(&stop) {
            loop {
                self.drain_tick();
                if self.buffer.is_empty() {
                    break;
                }
                if !matches!(stop.try_recv(), Err(TryRecvError::Empty)) {
                    break 'frames;
                }
            }
        }
        tracing::debug!("render scheduler stopped");
    }

    /// Run on a dedicated thread.
    pub fn spawn(self, clock: impl FrameClock + 'static) -> Result<SchedulerHandle> {
        let (stop_tx, stop_rx) = bounded(1);
        let buffer = Arc::clone(&self.buffer);
        let thread = thread::Builder::new()
            .name("render-scheduler".to_string())
            .spawn(move || self.run(clock, stop_rx))?;

        Ok(SchedulerHandle {
            stop: Some(stop_tx),
            thread: Some(thread),
            buffer,
        })
    }
}

/// Owner of a running scheduler thread. Dropping it stops the scheduler.
pub struct SchedulerHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
    buffer: Arc<EventBuffer>,
}

impl SchedulerHandle {
    /// Cancel scheduling, wait for the in-flight drain, discard queued events.
    pub fn stop(&mut self) {
        let Some(stop) = self.stop.take() else {
            return;
        };
        drop(stop);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("render scheduler thread panicked");
            }
        }
        let discarded = self.buffer.clear();
        tracing::debug!(discarded, "render scheduler stopped, buffer discarded");
    }

    pub fn is_running(&self) -> bool {
        self.stop.is_some()
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
