//! Virtual node stores.
//!
//! # Virtual Node Stores
//!
//! Each location's arc of the ring is cut into a fixed number of equally
//! wide virtual stores. A virtual store is:
//!
//! 1. **The unit of mutation**: nodes hashed into its arc are inserted and
//!    updated under the store's own lock, so ingestion for different stores
//!    never contends.
//! 2. **The unit of allocation**: a store is either unassigned or owned by
//!    exactly one client, and every accepted change is forwarded to that
//!    client's event queue.
//!
//! # Slots and collisions
//!
//! Nodes are keyed by their [`HashToken`]. Two different ids with the same
//! token share a slot: they are chained rather than overwritten, and the
//! collision is logged.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::event::{EventType, ManagedNodeEvent};
use crate::location::Location;
use crate::node::LogicalNode;
use crate::queue::ClientEventQueue;
use crate::ring::RingArc;
use crate::token::HashToken;
use crate::version::ResourceVersionMap;

/// Result of applying one event to a store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mutation {
    /// A node that was not in the store before.
    Inserted,
    /// An existing node moved to a newer resource version.
    Updated,
    /// Added event for a node already present.
    Duplicate,
    /// Modified event not newer than the stored version.
    Stale,
    /// Event type the store does not apply.
    Unsupported,
}

impl Mutation {
    /// True if the store changed and the event was forwarded.
    pub fn is_applied(&self) -> bool {
        matches!(self, Mutation::Inserted | Mutation::Updated)
    }
}

#[derive(Debug, Clone)]
struct StoredNode {
    resource_version: u64,
    node: LogicalNode,
}

#[derive(Debug, Default)]
struct Bucket {
    slots: HashMap<HashToken, Vec<StoredNode>>,
    host_num: usize,
}

#[derive(Debug)]
struct Assignment {
    client_id: String,
    queue: Weak<ClientEventQueue>,
}

/// Nodes of one location hashed into one arc of the ring.
///
/// # Invariants
///
/// - Every stored node's location equals the store's location
/// - Once assigned, a store never changes owner
#[derive(Debug)]
pub struct VirtualNodeStore {
    index: usize,
    location: Location,
    arc: RingArc,
    bucket: RwLock<Bucket>,
    assignment: OnceLock<Assignment>,
}

impl VirtualNodeStore {
    pub fn new(index: usize, location: Location, arc: RingArc) -> Self {
        Self {
            index,
            location,
            arc,
            bucket: RwLock::new(Bucket::default()),
            assignment: OnceLock::new(),
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn location(&self) -> Location {
        self.location
    }

    #[inline]
    pub fn arc(&self) -> RingArc {
        self.arc
    }

    /// Number of nodes currently held.
    pub fn host_num(&self) -> usize {
        self.bucket.read().host_num
    }

    pub fn assigned_client(&self) -> Option<&str> {
        self.assignment.get().map(|a| a.client_id.as_str())
    }

    pub fn is_assigned(&self) -> bool {
        self.assignment.get().is_some()
    }

    /// Hand the store to `client_id`, delivering future changes to `queue`.
    ///
    /// Returns false if the id is empty or the store is already owned; an
    /// existing assignment is never overwritten.
    pub fn assign_to_client(&self, client_id: &str, queue: &Arc<ClientEventQueue>) -> bool {
        if client_id.is_empty() {
            return false;
        }
        // Serialize against in-flight mutations, see `apply`.
        let _bucket = self.bucket.write();
        self.assignment
            .set(Assignment {
                client_id: client_id.to_string(),
                queue: Arc::downgrade(queue),
            })
            .is_ok()
    }

    /// Deep copy of every node plus the max resource version per location.
    pub fn snapshot(&self) -> (Vec<LogicalNode>, ResourceVersionMap) {
        let bucket = self.bucket.read();
        let mut nodes = Vec::with_capacity(bucket.host_num);
        let mut versions = ResourceVersionMap::new();
        for stored in bucket.slots.values().flatten() {
            nodes.push(stored.node.clone());
            versions.observe(self.location, stored.resource_version);
        }
        (nodes, versions)
    }

    /// Bookmark event pinned to this store's location.
    pub fn generate_bookmark_event(&self) -> ManagedNodeEvent {
        ManagedNodeEvent::bookmark(self.location)
    }

    /// Apply an Added or Modified event landing in slot `token`.
    ///
    /// An accepted change is enqueued to the owning client while both the
    /// client queue and the bucket are locked, so a concurrent list either
    /// sees the node and not the event, or neither.
    pub(crate) fn apply(&self, token: HashToken, event: ManagedNodeEvent) -> Mutation {
        loop {
            let assigned_before = self.assignment.get().is_some();
            let target = self.assignment.get().and_then(|a| a.queue.upgrade());
            let mut enqueue = target.as_ref().map(|q| q.lock_for_enqueue());
            let mut bucket = self.bucket.write();

            // Assigned between the check above and taking the bucket lock:
            // retry so the event reaches the new owner.
            if !assigned_before && self.assignment.get().is_some() {
                continue;
            }

            let outcome = self.mutate(&mut bucket, token, &event);
            if outcome.is_applied() {
                if let Some(guard) = enqueue.as_mut() {
                    guard.enqueue(event);
                }
            }
            return outcome;
        }
    }

    fn mutate(&self, bucket: &mut Bucket, token: HashToken, event: &ManagedNodeEvent) -> Mutation {
        let incoming = event.node();
        let rv = event.resource_version();

        match event.event_type() {
            EventType::Added | EventType::Modified => {}
            other => {
                warn!(store = self.index, event_type = ?other, "unsupported event type");
                return Mutation::Unsupported;
            }
        }

        let chain = bucket.slots.entry(token).or_default();
        if let Some(existing) = chain.iter_mut().find(|s| s.node.id == incoming.id) {
            if event.event_type() == EventType::Added {
                debug!(node_id = %incoming.id, "duplicate add ignored");
                return Mutation::Duplicate;
            }
            if existing.resource_version >= rv {
                debug!(
                    node_id = %incoming.id,
                    stored = existing.resource_version,
                    incoming = rv,
                    "stale update discarded"
                );
                return Mutation::Stale;
            }
            existing.resource_version = rv;
            existing.node = incoming.clone();
            return Mutation::Updated;
        }

        if let Some(other) = chain.first() {
            warn!(
                node_id = %incoming.id,
                colliding_with = %other.node.id,
                %token,
                "hash collision, chaining node in slot"
            );
        }
        chain.push(StoredNode {
            resource_version: rv,
            node: incoming.clone(),
        });
        bucket.host_num += 1;
        Mutation::Inserted
    }
}
