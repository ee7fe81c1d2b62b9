//! Live subscriptions feeding the render pipeline.
//!
//! Each subscription gets its own forwarding task that:
//! - normalizes every inbound message into a [`crate::RenderEvent`]
//! - replaces non-text payloads with a size placeholder
//! - pushes into the shared [`crate::render::EventBuffer`]
//!
//! Tasks stop on unsubscribe, on registry clear, or when the backend closes
//! the feed.
//!
//! # Example
//!
//! ```ignore
//! let registry = SubscriptionRegistry::new(buffer.clone(), &config);
//! registry.attach(Arc::new(MemoryBroker::new()));
//!
//! let info = registry.subscribe("orders.>")?;
//! println!("subscription {} ({} active)", info.id, info.count);
//!
//! registry.unsubscribe(info.id);
//! ```

mod registry;
mod types;

pub use registry::{normalize, SubscriptionRegistry};
pub use types::{
    parse_headers, validate_subject, EndReason, SubscriptionInfo, SubscriptionSummary,
};
