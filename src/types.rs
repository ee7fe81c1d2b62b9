//! Core types for the monitor pipeline.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Unique identifier for a subscription (monotonic per process).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        Timestamp(Utc::now().timestamp_micros())
    }

    pub fn from_millis(millis: i64) -> Self {
        Timestamp(millis.saturating_mul(1000))
    }

    /// ISO-8601 rendering with millisecond precision, e.g. `2024-05-01T12:00:00.000Z`.
    pub fn to_iso(self) -> String {
        DateTime::from_timestamp_micros(self.0)
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// What produced a render event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Live publish/subscribe traffic.
    #[serde(rename = "MSG")]
    Msg,
    /// A request/reply round trip.
    #[serde(rename = "RPC")]
    Rpc,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Msg => f.write_str("MSG"),
            EventKind::Rpc => f.write_str("RPC"),
        }
    }
}

/// Ordered multimap of message headers.
///
/// Insertion order is kept, and a name may carry several values. Serialized as
/// an object whose values are a string (one value) or an array (several).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value, keeping any existing values for the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Builder-style [`Headers::append`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.append(name, value);
        self
    }

    /// First value for a name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// All values for a name, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct names in order of first appearance.
    fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for (name, _) in &self.entries {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }
}

impl Serialize for Headers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let names = self.names();
        let mut map = serializer.serialize_map(Some(names.len()))?;
        for name in names {
            let values: Vec<&str> = self.get_all(name).collect();
            if values.len() == 1 {
                map.serialize_entry(name, values[0])?;
            } else {
                map.serialize_entry(name, &values)?;
            }
        }
        map.end()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HeaderValues {
    One(String),
    Many(Vec<String>),
}

struct HeadersVisitor;

impl<'de> Visitor<'de> for HeadersVisitor {
    type Value = Headers;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object of header names to a string or an array of strings")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Headers, A::Error> {
        let mut headers = Headers::new();
        while let Some((name, values)) = access.next_entry::<String, HeaderValues>()? {
            match values {
                HeaderValues::One(value) => headers.append(name, value),
                HeaderValues::Many(values) => {
                    for value in values {
                        headers.append(name.clone(), value);
                    }
                }
            }
        }
        Ok(headers)
    }
}

impl<'de> Deserialize<'de> for Headers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(HeadersVisitor)
    }
}

/// A normalized event waiting to be rendered.
///
/// Immutable once created. The payload is already decoded to text; binary data
/// has been replaced by a placeholder annotation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderEvent {
    pub subject: String,
    pub payload: String,
    pub kind: EventKind,
    pub headers: Option<Headers>,
    pub received_at: Timestamp,
}

impl RenderEvent {
    /// A live message event stamped with the current time.
    pub fn message(subject: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            payload: payload.into(),
            kind: EventKind::Msg,
            headers: None,
            received_at: Timestamp::now(),
        }
    }

    /// A request/reply event stamped with the current time.
    pub fn rpc(subject: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Rpc,
            ..Self::message(subject, payload)
        }
    }

    pub fn with_headers(mut self, headers: Option<Headers>) -> Self {
        self.headers = headers.filter(|h| !h.is_empty());
        self
    }
}

/// A raw message as delivered by the messaging collaborator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub subject: String,
    pub data: Vec<u8>,
    pub headers: Option<Headers>,
}

impl InboundMessage {
    pub fn new(subject: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            subject: subject.into(),
            data: data.into(),
            headers: None,
        }
    }
}

/// Operation carried by a key change feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum KeyOperation {
    Put,
    Delete,
    Purge,
}

impl KeyOperation {
    /// Delete and purge both remove the key from the inventory.
    pub fn is_removal(self) -> bool {
        matches!(self, KeyOperation::Delete | KeyOperation::Purge)
    }
}

/// One event from a key-value change feed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyChange {
    pub key: String,
    pub operation: KeyOperation,
    pub revision: u64,
}

impl KeyChange {
    pub fn new(key: impl Into<String>, operation: KeyOperation) -> Self {
        Self {
            key: key.into(),
            operation,
            revision: 0,
        }
    }
}

/// A stored key-value revision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KvEntry {
    pub key: String,
    pub value: Vec<u8>,
    pub revision: u64,
    pub operation: KeyOperation,
    pub created: Timestamp,
}

/// An entry read from a ranged log by position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamEntry {
    pub seq: u64,
    pub subject: String,
    pub data: Vec<u8>,
    pub time: Timestamp,
}

/// An entry returned by a range fetch, payload decoded for display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RangeEntry {
    pub seq: u64,
    pub subject: String,
    pub payload: String,
    pub time: Timestamp,
}
