//! In-process sequence-numbered logs.

use crate::client::RangedLog;
use crate::error::{MonitorError, Result};
use crate::types::{StreamEntry, Timestamp};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
struct StreamState {
    entries: BTreeMap<u64, StreamEntry>,
    last_seq: u64,
}

/// Append-only logs addressed by sequence number.
#[derive(Default)]
pub struct MemoryStreamLog {
    streams: RwLock<HashMap<String, StreamState>>,
    reads: AtomicUsize,
}

impl MemoryStreamLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, returning its sequence number (first is 1).
    pub fn append(&self, stream: &str, subject: &str, data: &[u8]) -> u64 {
        let mut streams = self.streams.write();
        let state = streams.entry(stream.to_string()).or_default();
        state.last_seq += 1;
        let seq = state.last_seq;
        state.entries.insert(
            seq,
            StreamEntry {
                seq,
                subject: subject.to_string(),
                data: data.to_vec(),
                time: Timestamp::now(),
            },
        );
        seq
    }

    /// Remove a range of positions. Sequence numbers are never reused.
    pub fn purge(&self, stream: &str, range: RangeInclusive<u64>) -> usize {
        let mut streams = self.streams.write();
        match streams.get_mut(stream) {
            Some(state) => {
                let before = state.entries.len();
                state.entries.retain(|seq, _| !range.contains(seq));
                before - state.entries.len()
            }
            None => 0,
        }
    }

    pub fn last_seq(&self, stream: &str) -> u64 {
        self.streams.read().get(stream).map_or(0, |s| s.last_seq)
    }

    /// Number of point reads served so far, missing positions included.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl RangedLog for MemoryStreamLog {
    fn entry_by_seq(&self, stream: &str, seq: u64) -> Result<StreamEntry> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let streams = self.streams.read();
        let state = streams
            .get(stream)
            .ok_or_else(|| MonitorError::NotFound(format!("stream {}", stream)))?;
        state
            .entries
            .get(&seq)
            .cloned()
            .ok_or_else(|| MonitorError::NotFound(format!("{} seq {}", stream, seq)))
    }
}
