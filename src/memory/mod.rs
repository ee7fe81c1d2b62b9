//! In-process backend.
//!
//! Implements the [`crate::client`] traits without a network so the pipeline
//! can run in tests, benches and hosts that embed their own traffic source:
//! - [`MemoryBroker`]: subject-based pub/sub with `*`/`>` wildcards and
//!   registered request responders
//! - [`MemoryKv`]: revisioned key-value buckets with change feeds
//! - [`MemoryStreamLog`]: sequence-numbered logs with purge support

mod broker;
mod kv;
mod stream;

pub use broker::{subject_matches, MemoryBroker};
pub use kv::MemoryKv;
pub use stream::MemoryStreamLog;
