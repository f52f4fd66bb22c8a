//! Resource distribution for the global resource service.
//!
//! This crate sits on top of `corelib` and provides:
//! - Client registration with capacity checks and virtual store allocation
//! - Snapshot-consistent list and watch per client
//! - Event ingestion with bounded, best-effort persistence

pub mod config;
pub mod distributor;
pub mod error;
pub mod persistence;
pub mod persister;

pub use config::DistributorConfig;
pub use distributor::ResourceDistributor;
pub use error::{DistributorError, Result};
pub use persistence::{FakeStore, NodeStorePersistence, VirtualNodeAssignment};
pub use persister::{PersistOutcome, Persister};
