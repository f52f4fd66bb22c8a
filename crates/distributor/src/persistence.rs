//! Persistence collaborator.
//!
//! The in-memory node store is the source of truth for serving; persistence
//! is best-effort durability. Backends implement [`NodeStorePersistence`];
//! [`FakeStore`] keeps everything in memory and can be told to fail.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use corelib::{Location, LogicalNode, NodeStoreStatus, VirtualNodeStore};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Key of the node store status record.
pub const NODE_STORE_STATUS_KEY: &str = "NodeStoreStatus";

/// Key of the virtual node assignment record.
pub const VIRTUAL_NODES_ASSIGNMENTS_KEY: &str = "VirtualNodesAssignments";

/// One virtual store handed to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualNodeConfig {
    pub index: usize,
    pub location: Location,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

impl From<&VirtualNodeStore> for VirtualNodeConfig {
    fn from(store: &VirtualNodeStore) -> Self {
        let arc = store.arc();
        Self {
            index: store.index(),
            location: store.location(),
            lower_bound: arc.lower,
            upper_bound: arc.upper,
        }
    }
}

/// Virtual stores assigned to one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualNodeAssignment {
    pub client_id: String,
    pub virtual_nodes: Vec<VirtualNodeConfig>,
}

/// Storage backend for nodes, store status and client assignments.
///
/// Calls are blocking and made off the async runtime. A `false` return is
/// a failed attempt and will be retried.
pub trait NodeStorePersistence: Send + Sync + 'static {
    fn persist_nodes(&self, nodes: &[LogicalNode]) -> bool;

    fn persist_node_store_status(&self, status: &NodeStoreStatus) -> bool;

    fn persist_virtual_nodes_assignments(&self, assignment: &VirtualNodeAssignment) -> bool;

    /// Backend name (for logging).
    fn name(&self) -> &'static str;
}

#[derive(Debug, Default)]
struct FakeState {
    records: BTreeMap<String, String>,
    assignments: BTreeMap<String, VirtualNodeAssignment>,
}

/// In-memory backend storing JSON records under the production key layout.
#[derive(Debug, Default)]
pub struct FakeStore {
    state: Mutex<FakeState>,
    fail_next: AtomicUsize,
    attempts: AtomicUsize,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls fail.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Total calls made, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.state.lock().records.get(key).cloned()
    }

    pub fn node(&self, key: &str) -> Option<LogicalNode> {
        self.get(key).and_then(|raw| serde_json::from_str(&raw).ok())
    }

    pub fn assignment(&self, client_id: &str) -> Option<VirtualNodeAssignment> {
        self.state.lock().assignments.get(client_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn attempt(&self) -> bool {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
    }
}

impl NodeStorePersistence for FakeStore {
    fn persist_nodes(&self, nodes: &[LogicalNode]) -> bool {
        if !self.attempt() {
            return false;
        }
        let mut state = self.state.lock();
        for node in nodes {
            let Ok(raw) = serde_json::to_string(node) else {
                return false;
            };
            state.records.insert(node.persistence_key(), raw);
        }
        debug!(count = nodes.len(), "persisted nodes");
        true
    }

    fn persist_node_store_status(&self, status: &NodeStoreStatus) -> bool {
        if !self.attempt() {
            return false;
        }
        let Ok(raw) = serde_json::to_string(status) else {
            return false;
        };
        self.state
            .lock()
            .records
            .insert(NODE_STORE_STATUS_KEY.to_string(), raw);
        true
    }

    fn persist_virtual_nodes_assignments(&self, assignment: &VirtualNodeAssignment) -> bool {
        if !self.attempt() {
            return false;
        }
        let mut state = self.state.lock();
        state
            .assignments
            .insert(assignment.client_id.clone(), assignment.clone());
        let Ok(raw) = serde_json::to_string(&state.assignments) else {
            return false;
        };
        state
            .records
            .insert(VIRTUAL_NODES_ASSIGNMENTS_KEY.to_string(), raw);
        true
    }

    fn name(&self) -> &'static str {
        "FakeStore"
    }
}
