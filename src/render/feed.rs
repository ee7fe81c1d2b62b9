//! Rendered items currently on screen.

use crate::payload::{self, RenderedBody};
use crate::types::{EventKind, Headers, RenderEvent, Timestamp};
use std::collections::VecDeque;

/// An event formatted for display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedItem {
    /// Render order, increasing across the session.
    pub id: u64,
    pub subject: String,
    pub kind: EventKind,
    pub headers: Option<Headers>,
    pub body: String,
    /// Original payload size in chars when the body was truncated.
    pub truncated_from: Option<usize>,
    pub structured: bool,
    pub received_at: Timestamp,
}

impl RenderedItem {
    /// Format an event. Never fails; see [`payload::render_body`].
    pub fn render(id: u64, event: RenderEvent, large_payload_threshold: usize) -> Self {
        let RenderedBody {
            text,
            truncated_from,
            structured,
        } = payload::render_body(&event.payload, large_payload_threshold);

        Self {
            id,
            subject: event.subject,
            kind: event.kind,
            headers: event.headers,
            body: text,
            truncated_from,
            structured,
            received_at: event.received_at,
        }
    }
}

/// Display filter over the rendered feed.
#[derive(Clone, Debug, Default)]
pub struct FeedFilter {
    /// Lowercased needle matched against subject and body.
    text: Option<String>,
    kind: Option<EventKind>,
}

impl FeedFilter {
    /// Case-insensitive substring match; blank text matches everything.
    pub fn text(needle: &str) -> Self {
        let needle = needle.trim();
        Self {
            text: (!needle.is_empty()).then(|| needle.to_lowercase()),
            kind: None,
        }
    }

    pub fn with_kind(mut self, kind: EventKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn matches(&self, item: &RenderedItem) -> bool {
        if let Some(kind) = self.kind {
            if item.kind != kind {
                return false;
            }
        }
        match &self.text {
            Some(needle) => {
                item.subject.to_lowercase().contains(needle)
                    || item.body.to_lowercase().contains(needle)
            }
            None => true,
        }
    }
}

/// Capped list of rendered items, newest first.
#[derive(Debug)]
pub struct RenderedFeed {
    items: VecDeque<RenderedItem>,
    cap: usize,
    evicted: u64,
}

impl RenderedFeed {
    pub fn new(cap: usize) -> Self {
        Self {
            items: VecDeque::new(),
            cap: cap.max(1),
            evicted: 0,
        }
    }

    /// Place a display-ordered batch ahead of everything already shown, then
    /// evict the oldest items over the cap. Returns how many were evicted.
    pub fn insert_batch(&mut self, batch: &[RenderedItem]) -> usize {
        for item in batch.iter().rev() {
            self.items.push_front(item.clone());
        }

        let mut evicted = 0;
        while self.items.len() > self.cap {
            self.items.pop_back();
            evicted += 1;
        }
        self.evicted += evicted as u64;
        evicted
    }

    /// Items newest first.
    pub fn items(&self) -> impl Iterator<Item = &RenderedItem> {
        self.items.iter()
    }

    pub fn snapshot(&self) -> Vec<RenderedItem> {
        self.items.iter().cloned().collect()
    }

    /// Items passing `filter`, newest first.
    pub fn visible(&self, filter: &FeedFilter) -> Vec<RenderedItem> {
        self.items
            .iter()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Items evicted since creation or the last clear.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.evicted = 0;
    }
}
