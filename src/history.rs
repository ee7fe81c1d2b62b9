//! Bounded log of admitted events, kept for export.

use crate::error::{MonitorError, Result};
use crate::payload;
use crate::types::{EventKind, Headers, RenderEvent, Timestamp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

/// One exported log line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// ISO-8601 receive time.
    pub timestamp: String,
    pub kind: EventKind,
    pub subject: String,
    pub headers: Option<Headers>,
    /// Parsed JSON when the payload parses, otherwise the raw text.
    pub payload: serde_json::Value,
}

impl HistoryEntry {
    pub fn from_event(event: &RenderEvent) -> Self {
        let payload = payload::parse_structured(&event.payload)
            .unwrap_or_else(|| serde_json::Value::String(event.payload.clone()));

        Self {
            timestamp: event.received_at.to_iso(),
            kind: event.kind,
            subject: event.subject.clone(),
            headers: event.headers.clone(),
            payload,
        }
    }
}

/// Serialization used for an export.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Json,
    MessagePack,
}

impl ExportFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::MessagePack => "application/msgpack",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::MessagePack => "msgpack",
        }
    }
}

/// A downloadable export.
#[derive(Clone, Debug)]
pub struct ExportBlob {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Append-only history with FIFO eviction.
pub struct LogHistoryStore {
    entries: Mutex<VecDeque<HistoryEntry>>,
    capacity: usize,
}

impl LogHistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Append a normalized copy of an event, evicting the oldest on overflow.
    pub fn record(&self, event: &RenderEvent) {
        let entry = HistoryEntry::from_event(event);
        let mut entries = self.entries.lock();
        entries.push_back(entry);
        if entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Serialize every entry, oldest first, as pretty JSON.
    pub fn export(&self) -> Result<ExportBlob> {
        self.export_as(ExportFormat::Json)
    }

    pub fn export_as(&self, format: ExportFormat) -> Result<ExportBlob> {
        let entries = self.entries();
        if entries.is_empty() {
            return Err(MonitorError::EmptyHistory);
        }

        let bytes = match format {
            ExportFormat::Json => serde_json::to_vec_pretty(&entries)?,
            ExportFormat::MessagePack => rmp_serde::to_vec_named(&entries)?,
        };
        let stamp = Timestamp::now().to_iso().replace([':', '.'], "-");

        Ok(ExportBlob {
            file_name: format!("monitor-logs-{}.{}", stamp, format.extension()),
            content_type: format.content_type(),
            bytes,
        })
    }

    /// Write an export into `dir`, returning the file path.
    pub fn export_to_path(&self, dir: impl AsRef<Path>, format: ExportFormat) -> Result<PathBuf> {
        let blob = self.export_as(format)?;
        let path = dir.as_ref().join(&blob.file_name);
        fs::write(&path, &blob.bytes)?;
        tracing::info!(path = %path.display(), entries = self.len(), "exported history");
        Ok(path)
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
