//! Event retention and delivery.
//!
//! - [`NodeEventQueue`]: bounded ring buffer of events for one location,
//!   searchable by resource version.
//! - [`ClientEventQueue`]: one client's set of per-location queues plus
//!   its single live watcher.

pub mod client_queue;
pub mod event_queue;

pub use client_queue::{ClientEventQueue, EnqueueGuard, SnapshotGuard};
pub use event_queue::{NodeEventQueue, LENGTH_OF_NODE_EVENT_QUEUE};
