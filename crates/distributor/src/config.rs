//! Distributor configuration.
//!
//! Loaded from JSON; every field has a default so a partial file (or no
//! file at all) yields a working setup.

use std::path::Path;
use std::time::Duration;

use corelib::{Region, ResourcePartition, LENGTH_OF_NODE_EVENT_QUEUE};
use serde::{Deserialize, Serialize};

use crate::error::{DistributorError, Result};

/// Smallest host count a client may ask for is one above this.
pub const MINIMAL_REQUEST_HOST_NUM: usize = 50;

/// Attempts made per persistence call before giving up.
pub const PERSIST_RETRY_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributorConfig {
    /// Number of regions placed on the ring.
    pub region_count: usize,
    /// Resource partitions per region.
    pub partition_count: usize,
    /// Virtual node stores per (region, partition).
    pub virtual_nodes_per_partition: usize,
    /// Registration requests must ask for more hosts than this.
    pub minimal_request_host_num: usize,
    /// Events retained per location in each client queue.
    pub event_queue_length: usize,
    /// Attempts per persistence call.
    pub persist_retry_limit: usize,
    /// Upper bound on how long ingestion waits for persistence.
    pub persist_timeout_ms: u64,
    /// Consecutive persistence failures that open the circuit breaker.
    pub circuit_breaker_threshold: usize,
    /// How long an open breaker skips persistence.
    pub circuit_breaker_cooldown_ms: u64,
    /// Buffer of the channel a transport hands to `watch`.
    pub watch_channel_capacity: usize,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            region_count: 5,
            partition_count: ResourcePartition::COUNT,
            virtual_nodes_per_partition: 200,
            minimal_request_host_num: MINIMAL_REQUEST_HOST_NUM,
            event_queue_length: LENGTH_OF_NODE_EVENT_QUEUE,
            persist_retry_limit: PERSIST_RETRY_LIMIT,
            persist_timeout_ms: 5_000,
            circuit_breaker_threshold: 3,
            circuit_breaker_cooldown_ms: 30_000,
            watch_channel_capacity: 100,
        }
    }
}

impl DistributorConfig {
    /// Read and validate a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DistributorError::InvalidConfig(format!("reading {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| DistributorError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(DistributorError::InvalidConfig(msg));
        if self.region_count == 0 || self.region_count > Region::COUNT {
            return invalid(format!("region_count must be within 1..={}", Region::COUNT));
        }
        if self.partition_count == 0 || self.partition_count > ResourcePartition::COUNT {
            return invalid(format!(
                "partition_count must be within 1..={}",
                ResourcePartition::COUNT
            ));
        }
        if self.virtual_nodes_per_partition == 0 {
            return invalid("virtual_nodes_per_partition must be positive".into());
        }
        if self.event_queue_length == 0 {
            return invalid("event_queue_length must be positive".into());
        }
        if self.persist_retry_limit == 0 {
            return invalid("persist_retry_limit must be positive".into());
        }
        if self.watch_channel_capacity == 0 {
            return invalid("watch_channel_capacity must be positive".into());
        }
        Ok(())
    }

    pub fn persist_timeout(&self) -> Duration {
        Duration::from_millis(self.persist_timeout_ms)
    }

    pub fn circuit_breaker_cooldown(&self) -> Duration {
        Duration::from_millis(self.circuit_breaker_cooldown_ms)
    }
}
