//! Monitor configuration.

use crate::error::Result;
use serde::Deserialize;
use std::time::Duration;

/// Tunables for the ingestion and rendering pipeline.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Max events removed from the buffer per drain tick.
    /// Default: 50
    pub batch_size: usize,

    /// Max rendered items kept on screen; oldest evicted first.
    /// Default: 200
    pub render_cap: usize,

    /// Max queued events waiting for a drain; oldest evicted first.
    /// Default: 10000
    pub buffer_capacity: usize,

    /// Max history entries kept for export.
    /// Default: 1000
    pub history_capacity: usize,

    /// Payloads longer than this (in chars) are rendered truncated, unparsed.
    /// Default: 20000
    pub large_payload_threshold: usize,

    /// Frame interval for the interval clock, in milliseconds.
    /// Default: 16
    pub frame_interval_ms: u64,

    /// Widest window accepted for a range fetch.
    /// Default: 50
    pub max_range_width: u64,

    /// Request/reply timeout used when the caller gives none, in milliseconds.
    /// Default: 2000
    pub request_timeout_ms: u64,

    /// Cap on concurrently active subscriptions (None = unbounded).
    pub max_subscriptions: Option<usize>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            render_cap: 200,
            buffer_capacity: 10_000,
            history_capacity: 1000,
            large_payload_threshold: 20_000,
            frame_interval_ms: 16,
            max_range_width: 50,
            request_timeout_ms: 2000,
            max_subscriptions: None,
        }
    }
}

impl MonitorConfig {
    /// Parse a JSON config; missing fields take their defaults.
    pub fn from_json(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
