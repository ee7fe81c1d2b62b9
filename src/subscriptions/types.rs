//! Subscription types.

use crate::error::{MonitorError, Result};
use crate::types::{Headers, SubscriptionId};
use serde::Serialize;

/// Result of a successful subscribe.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubscriptionInfo {
    pub id: SubscriptionId,
    pub subject: String,
    /// Active subscriptions after this one was added.
    pub count: usize,
}

/// An active subscription, for listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubscriptionSummary {
    pub id: SubscriptionId,
    pub subject: String,
    /// Events forwarded into the buffer so far (paused drops included).
    pub forwarded: u64,
}

/// Why a forwarding task ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndReason {
    /// Explicitly unsubscribed or the registry was cleared.
    Cancelled,
    /// The backend closed the feed (e.g. connection lost).
    FeedClosed,
}

/// Reject empty subjects and subjects containing whitespace.
pub fn validate_subject(subject: &str) -> Result<()> {
    if subject.is_empty() {
        return Err(MonitorError::InvalidInput("subject is empty".to_string()));
    }
    if subject.chars().any(char::is_whitespace) {
        return Err(MonitorError::InvalidInput(format!(
            "subject contains whitespace: {:?}",
            subject
        )));
    }
    Ok(())
}

/// Parse user-supplied headers.
///
/// Accepts a JSON object whose values are strings or arrays of strings. Blank
/// input means no headers.
pub fn parse_headers(input: &str) -> Result<Option<Headers>> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    let headers: Headers = serde_json::from_str(input)
        .map_err(|e| MonitorError::InvalidInput(format!("invalid headers JSON: {}", e)))?;
    Ok((!headers.is_empty()).then_some(headers))
}
