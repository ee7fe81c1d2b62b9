//! Bounded queue of events waiting to be rendered.

use crate::history::LogHistoryStore;
use crate::types::RenderEvent;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Outcome of a push.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Queued for the next drain.
    Queued,
    /// Queued, and the oldest queued event was evicted to make room.
    QueuedWithEviction,
    /// Dropped because live display is paused.
    Paused,
}

impl Admission {
    pub fn is_admitted(self) -> bool {
        !matches!(self, Admission::Paused)
    }
}

/// Counters describing buffer activity since the last reset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub queued: usize,
    pub admitted: u64,
    pub dropped_while_paused: u64,
    pub evicted: u64,
}

struct BufferState {
    queue: VecDeque<RenderEvent>,
    paused: bool,
    stats: BufferStats,
}

/// Producer/consumer buffer between event sources and the render loop.
///
/// Any number of forwarding threads push; one scheduler drains. Pause is
/// checked under the same lock as the enqueue, so an event is either dropped
/// or queued, never both.
pub struct EventBuffer {
    state: Mutex<BufferState>,
    capacity: usize,
    /// Receives a copy of every admitted event.
    history: Option<Arc<LogHistoryStore>>,
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(BufferState {
                queue: VecDeque::new(),
                paused: false,
                stats: BufferStats::default(),
            }),
            capacity: capacity.max(1),
            history: None,
        }
    }

    /// Record every admitted event into `history`.
    pub fn with_history(mut self, history: Arc<LogHistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    /// Append an event unless paused.
    pub fn push(&self, event: RenderEvent) -> Admission {
        let mut state = self.state.lock();
        if state.paused {
            state.stats.dropped_while_paused += 1;
            return Admission::Paused;
        }

        if let Some(history) = &self.history {
            history.record(&event);
        }

        state.stats.admitted += 1;
        state.queue.push_back(event);
        if state.queue.len() > self.capacity {
            state.queue.pop_front();
            state.stats.evicted += 1;
            tracing::debug!(capacity = self.capacity, "event buffer full, evicted oldest");
            Admission::QueuedWithEviction
        } else {
            Admission::Queued
        }
    }

    /// Pausing drops new events; unpausing does not bring them back.
    pub fn set_paused(&self, paused: bool) {
        self.state.lock().paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    /// Remove up to `max` events, oldest first.
    pub fn drain(&self, max: usize) -> Vec<RenderEvent> {
        let mut state = self.state.lock();
        let n = max.min(state.queue.len());
        state.queue.drain(..n).collect()
    }

    /// Discard queued events, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let n = state.queue.len();
        state.queue.clear();
        n
    }

    /// Back to a fresh-session baseline: empty, unpaused, zeroed counters.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.queue.clear();
        state.paused = false;
        state.stats = BufferStats::default();
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> BufferStats {
        let state = self.state.lock();
        BufferStats {
            queued: state.queue.len(),
            ..state.stats
        }
    }
}
