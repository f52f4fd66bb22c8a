//! Core library for the global resource distributor.
//!
//! This crate provides the partitioned in-memory node inventory:
//! - Location naming tables and the location ring
//! - Node and event data model
//! - Consistent-hash routing of nodes to virtual node stores
//! - Per-location event ring buffers and per-client watch queues
//! - The node store tying them together

pub mod error;
pub mod event;
pub mod location;
pub mod node;
pub mod queue;
pub mod ring;
pub mod store;
pub mod token;
pub mod version;
pub mod vnode;

pub use error::{Error, Result};
pub use event::{Checkpoint, EventType, ManagedNodeEvent, NodeEvent};
pub use location::{Location, Region, ResourcePartition};
pub use node::LogicalNode;
pub use queue::{ClientEventQueue, NodeEventQueue, LENGTH_OF_NODE_EVENT_QUEUE};
pub use ring::{LocationRing, RingArc};
pub use store::{BatchStats, NodeStore, NodeStoreStatus};
pub use token::HashToken;
pub use version::ResourceVersionMap;
pub use vnode::{Mutation, VirtualNodeStore};
