//! Gap-tolerant ranged reads from a sequence-numbered log.

use crate::client::RangedLog;
use crate::error::{MonitorError, Result};
use crate::payload;
use crate::types::RangeEntry;
use std::thread;

/// Result of one positional read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Slot {
    Found(RangeEntry),
    /// The position could not be read (purged, never written, read failed).
    Missing(u64),
}

/// Check a window against the widest allowed range.
///
/// This is the caller-side limit; [`fetch_range`] itself never truncates.
pub fn validate_window(start: u64, end: u64, max_width: u64) -> Result<()> {
    let start = start.max(1);
    let end = end.max(1);
    if end >= start && end - start + 1 > max_width {
        return Err(MonitorError::InvalidInput(format!(
            "range {}..={} spans {} entries, limit is {}",
            start,
            end,
            end - start + 1,
            max_width
        )));
    }
    Ok(())
}

/// Read one position, mapping any failure to [`Slot::Missing`].
fn read_slot(log: &dyn RangedLog, stream: &str, seq: u64) -> Slot {
    match log.entry_by_seq(stream, seq) {
        Ok(entry) => Slot::Found(RangeEntry {
            seq: entry.seq,
            subject: entry.subject,
            payload: payload::decode(&entry.data),
            time: entry.time,
        }),
        Err(e) => {
            tracing::debug!(stream, seq, error = %e, "range position missing");
            Slot::Missing(seq)
        }
    }
}

/// Fetch every position in `start..=end` concurrently.
///
/// Both bounds are clamped to at least 1. An inverted range returns nothing
/// without reading. Missing positions are skipped; the rest are returned
/// newest sequence first.
///
/// One thread is started per position, so callers bound the window first
/// (see [`validate_window`]). A position whose thread cannot be started is
/// treated as missing.
pub fn fetch_range(log: &dyn RangedLog, stream: &str, start: u64, end: u64) -> Vec<RangeEntry> {
    let start = start.max(1);
    let end = end.max(1);
    if end < start {
        return Vec::new();
    }

    let slots: Vec<Slot> = thread::scope(|scope| {
        let handles: Vec<_> = (start..=end)
            .map(|seq| {
                let handle = thread::Builder::new()
                    .name(format!("range-{}", seq))
                    .spawn_scoped(scope, move || read_slot(log, stream, seq));
                (seq, handle)
            })
            .collect();
        handles
            .into_iter()
            .map(|(seq, handle)| match handle {
                Ok(handle) => handle.join().unwrap_or(Slot::Missing(seq)),
                Err(e) => {
                    tracing::warn!(stream, seq, error = %e, "range read not started");
                    Slot::Missing(seq)
                }
            })
            .collect()
    });

    let mut entries: Vec<RangeEntry> = slots
        .into_iter()
        .filter_map(|slot| match slot {
            Slot::Found(entry) => Some(entry),
            Slot::Missing(_) => None,
        })
        .collect();
    entries.reverse();

    let missing = (end - start + 1) as usize - entries.len();
    if missing > 0 {
        tracing::debug!(stream, start, end, missing, "range fetched with gaps");
    }
    entries
}
