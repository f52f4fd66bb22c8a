//! Node events flowing from region managers to watching clients.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::location::Location;
use crate::node::{LogicalNode, NodeGeoInfo};

/// Kind of change carried by a [`NodeEvent`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Added,
    Modified,
    Deleted,
    Bookmark,
    Error,
}

/// Latency checkpoints stamped on an event as it moves through the system.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(usize)]
pub enum Checkpoint {
    AggregatorReceived = 0,
    DistributorReceived = 1,
    DistributorSending = 2,
    DistributorSent = 3,
    SerializerEncoded = 4,
    SerializerSent = 5,
}

impl Checkpoint {
    pub const COUNT: usize = 6;
}

/// A change to one node.
///
/// Checkpoints are process-local and never serialized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub node: LogicalNode,
    #[serde(skip)]
    checkpoints: [Option<SystemTime>; Checkpoint::COUNT],
}

impl NodeEvent {
    pub fn new(event_type: EventType, node: LogicalNode) -> Self {
        Self {
            event_type,
            node,
            checkpoints: [None; Checkpoint::COUNT],
        }
    }

    pub fn added(node: LogicalNode) -> Self {
        Self::new(EventType::Added, node)
    }

    pub fn modified(node: LogicalNode) -> Self {
        Self::new(EventType::Modified, node)
    }

    /// Stamp `checkpoint` with the current wall-clock time.
    pub fn set_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.checkpoints[checkpoint as usize] = Some(SystemTime::now());
    }

    pub fn checkpoint(&self, checkpoint: Checkpoint) -> Option<SystemTime> {
        self.checkpoints[checkpoint as usize]
    }

    /// Time elapsed between two stamped checkpoints, if both are present
    /// and ordered.
    pub fn elapsed_between(&self, from: Checkpoint, to: Checkpoint) -> Option<Duration> {
        let from = self.checkpoint(from)?;
        let to = self.checkpoint(to)?;
        to.duration_since(from).ok()
    }
}

/// An event after the distributor resolved its location and parsed its
/// resource version. This is the unit stored in event queues.
#[derive(Clone, Debug, PartialEq)]
pub struct ManagedNodeEvent {
    event: NodeEvent,
    location: Location,
    resource_version: u64,
}

impl ManagedNodeEvent {
    /// Wrap a wire event, resolving location and resource version.
    pub fn from_event(event: NodeEvent) -> Result<Self> {
        let location = event.node.location()?;
        let resource_version = event.node.resource_version()?;
        Ok(Self {
            event,
            location,
            resource_version,
        })
    }

    /// A node-less bookmark pinned to `location` at version 0.
    ///
    /// Seeds a client's per-location queue so that a watch has a version
    /// floor before any real traffic for that location arrives.
    pub fn bookmark(location: Location) -> Self {
        let node = LogicalNode {
            resource_version: "0".to_string(),
            geo_info: NodeGeoInfo::at(location),
            ..Default::default()
        };
        Self {
            event: NodeEvent::new(EventType::Bookmark, node),
            location,
            resource_version: 0,
        }
    }

    #[inline]
    pub fn location(&self) -> Location {
        self.location
    }

    #[inline]
    pub fn resource_version(&self) -> u64 {
        self.resource_version
    }

    #[inline]
    pub fn event_type(&self) -> EventType {
        self.event.event_type
    }

    pub fn event(&self) -> &NodeEvent {
        &self.event
    }

    pub fn node(&self) -> &LogicalNode {
        &self.event.node
    }

    pub fn set_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.event.set_checkpoint(checkpoint);
    }

    pub fn into_event(self) -> NodeEvent {
        self.event
    }
}
