//! Error types for the monitor core.

use std::time::Duration;
use thiserror::Error;

/// Main error type for monitor operations.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Not connected")]
    NotConnected,

    #[error("Request timed out after {}ms", timeout.as_millis())]
    Timeout { timeout: Duration },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No logs to export")]
    EmptyHistory,

    #[error("Subscription limit reached ({0} active)")]
    SubscriptionLimit(usize),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl MonitorError {
    /// True for conditions shown to the user as information rather than failure.
    pub fn is_informational(&self) -> bool {
        matches!(self, MonitorError::EmptyHistory)
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(e: serde_json::Error) -> Self {
        MonitorError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for MonitorError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        MonitorError::Serialization(e.to_string())
    }
}

/// Result type for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;
