//! Key inventory reconciliation.
//!
//! A [`KeySetReconciler`] watches one key-value target at a time and keeps an
//! O(1) membership set converging to the server's keys, whatever the order or
//! redundancy of the feed.

mod reconciler;
mod set;

pub use reconciler::{KeySetListener, KeySetReconciler, NoopListener, WatchStatus};
pub use set::{KeyEvent, KeySet};
