//! The node store: every virtual store of every location.
//!
//! Incoming events are routed by consistent hashing: the node id is hashed
//! into its location's arc and the owning virtual store is found by floor
//! division. Routing needs no shared state, so concurrent batches only
//! contend on the virtual stores they actually touch.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::event::ManagedNodeEvent;
use crate::location::Location;
use crate::node::LogicalNode;
use crate::ring::{LocationRing, RingArc, RingPosition, VirtualRouter};
use crate::version::ResourceVersionMap;
use crate::vnode::{Mutation, VirtualNodeStore};

/// Topology and progress of a node store, as handed to persistence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStoreStatus {
    pub region_count: usize,
    pub partition_count: usize,
    pub virtual_nodes_per_partition: usize,
    pub current_resource_versions: ResourceVersionMap,
}

/// Outcome of one call to [`NodeStore::process_node_events`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub inserted: usize,
    pub updated: usize,
    pub ignored: usize,
    pub unroutable: usize,
    /// Copies of the nodes that were inserted or updated, in batch order.
    pub touched: Vec<LogicalNode>,
}

/// All virtual stores covering the ring.
///
/// Owns the global host counter and the global resource version map, each
/// behind its own leaf lock.
#[derive(Debug)]
pub struct NodeStore {
    ring: LocationRing,
    router: VirtualRouter,
    stores: Vec<Arc<VirtualNodeStore>>,
    resource_versions: RwLock<ResourceVersionMap>,
    total_hosts: Mutex<usize>,
}

impl NodeStore {
    /// Build `virtual_nodes_per_partition × region_count × partition_count`
    /// virtual stores tiling the ring.
    pub fn new(
        virtual_nodes_per_partition: usize,
        region_count: usize,
        partition_count: usize,
    ) -> Result<Self> {
        if virtual_nodes_per_partition == 0 {
            return Err(Error::Topology(
                "virtual nodes per partition must be positive".to_string(),
            ));
        }
        let ring = LocationRing::new(region_count, partition_count)?;
        let router = VirtualRouter::new(virtual_nodes_per_partition);

        let mut stores = Vec::with_capacity(ring.len() * virtual_nodes_per_partition);
        for location in ring.locations() {
            let Some(arc) = ring.arc_for(&location) else {
                continue;
            };
            for sub in arc.split(virtual_nodes_per_partition) {
                stores.push(Arc::new(VirtualNodeStore::new(stores.len(), location, sub)));
            }
        }

        info!(
            region_count,
            partition_count,
            virtual_nodes_per_partition,
            virtual_stores = stores.len(),
            "node store initialized"
        );

        Ok(Self {
            ring,
            router,
            stores,
            resource_versions: RwLock::new(ResourceVersionMap::new()),
            total_hosts: Mutex::new(0),
        })
    }

    pub fn ring(&self) -> &LocationRing {
        &self.ring
    }

    pub fn virtual_nodes_per_partition(&self) -> usize {
        self.router.per_location()
    }

    pub fn virtual_stores(&self) -> &[Arc<VirtualNodeStore>] {
        &self.stores
    }

    pub fn virtual_store(&self, index: usize) -> Option<&Arc<VirtualNodeStore>> {
        self.stores.get(index)
    }

    /// Index of the virtual store that owns `node_id` in `location`.
    pub fn route(&self, node_id: &str, location: &Location) -> Option<usize> {
        let (index, _, _) = self.locate(node_id, location)?;
        Some(index)
    }

    fn locate(&self, node_id: &str, location: &Location) -> Option<(usize, RingArc, RingPosition)> {
        let location_index = self.ring.location_index(location)?;
        let arc = self.ring.arc_for(location)?;
        let position = RingPosition::locate(node_id, arc);
        let index = self.router.route(location_index, arc, &position);
        Some((index, arc, position))
    }

    /// Route each event to its virtual store and apply it.
    ///
    /// Events for locations outside the topology are logged and skipped;
    /// they never fail the batch. Returns the updated global resource
    /// version map.
    pub fn process_node_events(
        &self,
        events: Vec<ManagedNodeEvent>,
    ) -> (bool, ResourceVersionMap, BatchStats) {
        let mut stats = BatchStats::default();
        let mut observed = ResourceVersionMap::new();

        for event in events {
            let location = event.location();
            let Some((index, _, position)) = self.locate(&event.node().id, &location) else {
                warn!(node_id = %event.node().id, %location, "event for location outside topology skipped");
                stats.unroutable += 1;
                continue;
            };

            let rv = event.resource_version();
            let node = event.node().clone();
            let outcome = self.stores[index].apply(position.token, event);
            match outcome {
                Mutation::Inserted => {
                    stats.inserted += 1;
                    *self.total_hosts.lock() += 1;
                }
                Mutation::Updated => stats.updated += 1,
                Mutation::Duplicate | Mutation::Stale | Mutation::Unsupported => {
                    stats.ignored += 1
                }
            }
            if outcome.is_applied() {
                stats.touched.push(node);
            }
            observed.observe(location, rv);
        }

        let mut versions = self.resource_versions.write();
        versions.merge(&observed);
        (true, versions.clone(), stats)
    }

    /// True if unassigned stores hold at least `requested` hosts in total.
    ///
    /// Callers serialize allocation decisions around this; it does not
    /// block ingestion.
    pub fn check_free_capacity(&self, requested: usize) -> bool {
        let mut free = 0;
        for store in &self.stores {
            if store.is_assigned() {
                continue;
            }
            free += store.host_num();
            if free >= requested {
                return true;
            }
        }
        false
    }

    pub fn total_host_num(&self) -> usize {
        *self.total_hosts.lock()
    }

    pub fn current_resource_versions(&self) -> ResourceVersionMap {
        self.resource_versions.read().clone()
    }

    pub fn status(&self) -> NodeStoreStatus {
        NodeStoreStatus {
            region_count: self.ring.region_count(),
            partition_count: self.ring.partition_count(),
            virtual_nodes_per_partition: self.router.per_location(),
            current_resource_versions: self.current_resource_versions(),
        }
    }
}
