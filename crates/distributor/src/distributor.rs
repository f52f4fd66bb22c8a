//! The resource distributor.
//!
//! Coordinates client registration, list, watch and event ingestion
//! against one [`NodeStore`] and the per-client event queues.
//!
//! # Lock order
//!
//! allocation lock → client queue state → virtual store bucket →
//! per-location event queue. The node store's host counter and version map
//! are leaves and are never held while taking another lock. DashMap shards
//! are only held long enough to clone an `Arc` out.

use std::collections::HashSet;
use std::sync::Arc;

use corelib::{
    Checkpoint, ClientEventQueue, EventType, HashToken, LogicalNode, ManagedNodeEvent, NodeEvent,
    NodeStore, ResourceVersionMap, VirtualNodeStore,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::DistributorConfig;
use crate::error::{DistributorError, Result};
use crate::persistence::{NodeStorePersistence, VirtualNodeAssignment, VirtualNodeConfig};
use crate::persister::{PersistOutcome, Persister};

/// Root object owning the node store and every client's queue.
///
/// Constructed once by the composition layer and shared behind an `Arc`.
pub struct ResourceDistributor {
    config: DistributorConfig,
    node_store: NodeStore,
    client_queues: DashMap<String, Arc<ClientEventQueue>>,
    client_stores: DashMap<String, Vec<Arc<VirtualNodeStore>>>,
    allocation_lock: Mutex<()>,
    persister: Persister,
}

impl ResourceDistributor {
    pub fn new(
        config: DistributorConfig,
        persistence: Arc<dyn NodeStorePersistence>,
    ) -> Result<Self> {
        config.validate()?;
        let node_store = NodeStore::new(
            config.virtual_nodes_per_partition,
            config.region_count,
            config.partition_count,
        )?;
        let persister = Persister::new(persistence, &config);
        info!(backend = persister.backend_name(), "resource distributor created");

        Ok(Self {
            config,
            node_store,
            client_queues: DashMap::new(),
            client_stores: DashMap::new(),
            allocation_lock: Mutex::new(()),
            persister,
        })
    }

    pub fn config(&self) -> &DistributorConfig {
        &self.config
    }

    pub fn node_store(&self) -> &NodeStore {
        &self.node_store
    }

    pub fn client_count(&self) -> usize {
        self.client_queues.len()
    }

    /// Virtual stores assigned to `client_id`.
    pub fn virtual_stores_for(&self, client_id: &str) -> Option<Vec<Arc<VirtualNodeStore>>> {
        self.client_stores.get(client_id).map(|s| s.clone())
    }

    /// Register a client and allocate at least `requested` hosts to it.
    ///
    /// Whole virtual stores are handed out until the request is met, so
    /// the client may receive more hosts than it asked for.
    pub async fn register_client(&self, requested: usize) -> Result<String> {
        let client_id = Uuid::new_v4().to_string();
        if requested <= self.config.minimal_request_host_num {
            return Err(DistributorError::HostRequestLessThanMinimal {
                requested,
                minimal: self.config.minimal_request_host_num,
            });
        }

        let assignment = self.allocate(&client_id, requested)?;
        let hosts: usize = self
            .virtual_stores_for(&client_id)
            .map(|stores| stores.iter().map(|s| s.host_num()).sum())
            .unwrap_or_default();
        info!(
            %client_id,
            requested,
            hosts,
            virtual_stores = assignment.virtual_nodes.len(),
            "client registered"
        );
        metrics::counter!("grs_distributor_clients_registered_total").increment(1);

        self.persister
            .run("virtual node assignment", move |backend| {
                backend.persist_virtual_nodes_assignments(&assignment)
            })
            .await;
        let status = self.node_store.status();
        self.persister
            .run("node store status", move |backend| {
                backend.persist_node_store_status(&status)
            })
            .await;

        Ok(client_id)
    }

    fn allocate(&self, client_id: &str, requested: usize) -> Result<VirtualNodeAssignment> {
        let _allocation = self.allocation_lock.lock();

        let total = self.node_store.total_host_num();
        if requested > total {
            return Err(DistributorError::HostRequestExceedLimit { requested, total });
        }
        if !self.node_store.check_free_capacity(requested) {
            return Err(DistributorError::HostRequestExceedCapacity { requested });
        }
        if self.client_queues.contains_key(client_id) {
            return Err(DistributorError::ClientIdExisted(client_id.to_string()));
        }

        let stores = self.node_store.virtual_stores().len();
        let offset = (HashToken::from_key(client_id).0 % stores as u64) as usize;
        let selected = self.select_free_stores(offset, requested);
        let queue = Arc::new(ClientEventQueue::new(client_id, self.config.event_queue_length));

        let mut seeded = HashSet::new();
        for store in &selected {
            if seeded.insert(store.location()) {
                queue.enqueue(store.generate_bookmark_event());
            }
        }

        let mut assigned = Vec::with_capacity(selected.len());
        for store in selected {
            if store.assign_to_client(client_id, &queue) {
                assigned.push(store);
            } else {
                error!(%client_id, store = store.index(), "virtual store already assigned");
            }
        }

        let assignment = VirtualNodeAssignment {
            client_id: client_id.to_string(),
            virtual_nodes: assigned
                .iter()
                .map(|s| VirtualNodeConfig::from(s.as_ref()))
                .collect(),
        };
        self.client_stores.insert(client_id.to_string(), assigned);
        self.client_queues.insert(client_id.to_string(), queue);
        Ok(assignment)
    }

    /// Unassigned stores from `offset` onwards, wrapping, until `requested`
    /// hosts are covered.
    ///
    /// Empty stores are taken too: their locations get a bookmark, so the
    /// client can watch them before any node arrives. The offset is derived
    /// from the client id so that consecutive clients spread over
    /// different locations.
    fn select_free_stores(&self, offset: usize, requested: usize) -> Vec<Arc<VirtualNodeStore>> {
        let stores = self.node_store.virtual_stores();

        let mut selected = Vec::new();
        let mut hosts = 0;
        for i in 0..stores.len() {
            let store = &stores[(offset + i) % stores.len()];
            if store.is_assigned() {
                continue;
            }
            selected.push(Arc::clone(store));
            hosts += store.host_num();
            if hosts >= requested {
                break;
            }
        }
        selected
    }

    fn client_queue(&self, client_id: &str) -> Result<Arc<ClientEventQueue>> {
        self.client_queues
            .get(client_id)
            .map(|q| Arc::clone(&q))
            .ok_or_else(|| DistributorError::ClientNotFound(client_id.to_string()))
    }

    /// Copies of every node assigned to `client_id` and the resource
    /// versions to resume a watch from.
    ///
    /// Enqueues for this client are blocked while the stores are read, so
    /// a watch started from the returned map neither misses nor repeats
    /// an event.
    pub fn list_nodes_for_client(
        &self,
        client_id: &str,
    ) -> Result<(Vec<LogicalNode>, ResourceVersionMap)> {
        let queue = self.client_queue(client_id)?;
        let stores = self
            .virtual_stores_for(client_id)
            .ok_or_else(|| DistributorError::ClientNotFound(client_id.to_string()))?;

        let snapshots: Vec<_> = {
            let _snapshot = queue.snapshot_lock();
            stores.iter().map(|s| s.snapshot()).collect()
        };

        let mut nodes = Vec::with_capacity(snapshots.iter().map(|(n, _)| n.len()).sum());
        let mut versions = ResourceVersionMap::new();
        for (store_nodes, store_versions) in snapshots {
            nodes.extend(store_nodes);
            versions.merge(&store_versions);
        }
        debug!(%client_id, nodes = nodes.len(), "listed nodes");
        Ok((nodes, versions))
    }

    /// Stream changes newer than `resource_versions` to `out` until `stop`
    /// fires. At most one watch per client may be active.
    ///
    /// Must be called from within a tokio runtime.
    pub fn watch(
        &self,
        client_id: &str,
        resource_versions: &ResourceVersionMap,
        out: mpsc::Sender<NodeEvent>,
        stop: oneshot::Receiver<()>,
    ) -> Result<()> {
        let queue = self.client_queue(client_id)?;
        if resource_versions.is_empty() {
            return Err(DistributorError::MissingWatchArgument("resource versions"));
        }
        queue.watch(resource_versions, out, stop)?;
        Ok(())
    }

    /// Ingest a batch of upstream events.
    ///
    /// Events that cannot be routed (unknown location, unparsable version,
    /// unsupported type) are logged and dropped individually. Touched nodes
    /// and the store status are then persisted with bounded retry before
    /// the updated global resource version map is returned. The flag is
    /// false only when a persistence task crashed.
    pub async fn process_events(&self, events: Vec<NodeEvent>) -> (bool, ResourceVersionMap) {
        let received = events.len();
        let mut managed = Vec::with_capacity(received);
        let mut rejected = 0usize;

        for mut event in events {
            event.set_checkpoint(Checkpoint::DistributorReceived);
            if let Some(latency) =
                event.elapsed_between(Checkpoint::AggregatorReceived, Checkpoint::DistributorReceived)
            {
                metrics::histogram!("grs_distributor_receive_latency_seconds")
                    .record(latency.as_secs_f64());
            }

            if !matches!(event.event_type, EventType::Added | EventType::Modified) {
                warn!(node_id = %event.node.id, event_type = ?event.event_type, "unsupported event type dropped");
                rejected += 1;
                continue;
            }

            match ManagedNodeEvent::from_event(event) {
                Ok(m) => managed.push(m),
                Err(e) => {
                    warn!(error = %e, "dropping unroutable event");
                    rejected += 1;
                }
            }
        }

        let (ok, versions, stats) = self.node_store.process_node_events(managed);
        let skipped = rejected + stats.unroutable;
        metrics::counter!("grs_distributor_events_ingested_total").increment(received as u64);
        metrics::counter!("grs_distributor_events_skipped_total").increment(skipped as u64);
        metrics::gauge!("grs_distributor_total_hosts").set(self.node_store.total_host_num() as f64);
        debug!(
            received,
            inserted = stats.inserted,
            updated = stats.updated,
            ignored = stats.ignored,
            skipped,
            "processed event batch"
        );

        let touched = stats.touched;
        let persisted_nodes = self
            .persister
            .run("nodes", move |backend| backend.persist_nodes(&touched))
            .await;
        let status = self.node_store.status();
        let persisted_status = self
            .persister
            .run("node store status", move |backend| {
                backend.persist_node_store_status(&status)
            })
            .await;

        let crashed = [persisted_nodes, persisted_status].contains(&PersistOutcome::Panicked);
        (ok && !crashed, versions)
    }
}
