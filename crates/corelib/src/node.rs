//! Logical node records.
//!
//! A [`LogicalNode`] is the minimal scheduling-relevant view of a machine
//! reported by an upstream region manager. Nodes are identified by a string
//! id that is unique per source; the resource version is scoped to the
//! node's location, not global.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::location::Location;

/// Bit flags reported in [`LogicalNode::conditions`].
pub mod condition {
    pub const READY: u8 = 1 << 0;
    pub const MEMORY_PRESSURE: u8 = 1 << 1;
    pub const DISK_PRESSURE: u8 = 1 << 2;
    pub const PID_PRESSURE: u8 = 1 << 3;
    pub const NETWORK_UNAVAILABLE: u8 = 1 << 4;
}

/// Geographic placement of a node.
///
/// Region and partition travel as raw integers so that an out-of-table
/// value can be reported instead of rejected at decode time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeGeoInfo {
    pub region: i32,
    pub resource_partition: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_center: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault_domain: Option<String>,
}

impl NodeGeoInfo {
    pub fn at(location: Location) -> Self {
        Self {
            region: location.region.index() as i32,
            resource_partition: location.partition.index() as i32,
            ..Default::default()
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTaints {
    pub no_schedule: bool,
    pub no_execute: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialHardwareTypes {
    pub has_gpu: bool,
    pub has_fpga: bool,
}

/// Allocatable capacity of a node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeResource {
    pub milli_cpu: i64,
    pub memory: i64,
    pub ephemeral_storage: i64,
    pub allowed_pod_number: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scalar_resources: BTreeMap<String, i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMachineType(pub String);

/// A node's scheduling-relevant record.
///
/// Cloning is a deep value copy; stores hand out clones only, never
/// references into their buckets.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalNode {
    pub id: String,
    /// String-encoded, monotonically increasing per location.
    pub resource_version: String,
    pub geo_info: NodeGeoInfo,
    #[serde(default)]
    pub taints: NodeTaints,
    #[serde(default)]
    pub special_hardware_types: SpecialHardwareTypes,
    #[serde(default)]
    pub allocatable_resource: NodeResource,
    #[serde(default)]
    pub conditions: u8,
    #[serde(default)]
    pub reserved: bool,
    #[serde(default)]
    pub machine_type: NodeMachineType,
}

impl LogicalNode {
    pub fn new(id: impl Into<String>, resource_version: u64, location: Location) -> Self {
        Self {
            id: id.into(),
            resource_version: resource_version.to_string(),
            geo_info: NodeGeoInfo::at(location),
            ..Default::default()
        }
    }

    /// Parse the string-encoded resource version.
    pub fn resource_version(&self) -> Result<u64> {
        self.resource_version
            .parse()
            .map_err(|_| Error::InvalidResourceVersion(self.resource_version.clone()))
    }

    /// Resolve the node's location against the naming tables.
    pub fn location(&self) -> Result<Location> {
        Location::from_raw(self.geo_info.region, self.geo_info.resource_partition)
    }

    /// Key under which the persistence collaborator stores this node.
    pub fn persistence_key(&self) -> String {
        format!(
            "MinNode.{}.{}.{}",
            self.id, self.geo_info.region, self.geo_info.resource_partition
        )
    }

    pub fn is_ready(&self) -> bool {
        self.conditions & condition::READY != 0
    }
}
