//! Per-client aggregate event queue and watch forwarding.
//!
//! Enqueues take the queue's state lock exclusively; list snapshots take it
//! shared. Holding the shared side while snapshotting virtual stores keeps
//! the snapshot and the watch resume point consistent: nothing can be
//! enqueued for this client while the snapshot is being read.
//!
//! Lock order: client queue state → virtual store bucket → per-location
//! event queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::event::{Checkpoint, ManagedNodeEvent, NodeEvent};
use crate::location::Location;
use crate::queue::event_queue::NodeEventQueue;
use crate::version::ResourceVersionMap;

#[derive(Debug)]
struct Watcher {
    id: u64,
    mailbox: mpsc::Sender<ManagedNodeEvent>,
}

#[derive(Debug, Default)]
struct QueueState {
    queues: HashMap<Location, NodeEventQueue>,
    watcher: Option<Watcher>,
}

impl QueueState {
    fn push(&mut self, event: ManagedNodeEvent, queue_length: usize) {
        let queue = self
            .queues
            .entry(event.location())
            .or_insert_with(|| NodeEventQueue::with_capacity(queue_length));

        match &self.watcher {
            Some(watcher) => {
                queue.enqueue(event.clone());
                match watcher.mailbox.try_send(event) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        // Forwarder drains what is buffered, then ends the
                        // stream; the client has to list again.
                        warn!(watch_id = watcher.id, "watcher mailbox full, ending watch");
                        self.watcher = None;
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(watch_id = watcher.id, "watcher mailbox closed, dropping watcher");
                        self.watcher = None;
                    }
                }
            }
            None => queue.enqueue(event),
        }
    }
}

/// Exclusive enqueue access to a client's queue.
///
/// Virtual stores acquire this before their own bucket lock so that a
/// mutation and its event become visible to list/watch together.
pub struct EnqueueGuard<'a> {
    state: RwLockWriteGuard<'a, QueueState>,
    queue_length: usize,
}

impl EnqueueGuard<'_> {
    pub fn enqueue(&mut self, event: ManagedNodeEvent) {
        self.state.push(event, self.queue_length);
    }
}

/// Shared snapshot access; blocks enqueues while held.
pub struct SnapshotGuard<'a> {
    _state: RwLockReadGuard<'a, QueueState>,
}

/// One client's event queues and its (at most one) live watcher.
#[derive(Debug)]
pub struct ClientEventQueue {
    client_id: String,
    queue_length: usize,
    state: RwLock<QueueState>,
    next_watch_id: AtomicU64,
}

impl ClientEventQueue {
    pub fn new(client_id: impl Into<String>, queue_length: usize) -> Self {
        Self {
            client_id: client_id.into(),
            queue_length,
            state: RwLock::new(QueueState::default()),
            next_watch_id: AtomicU64::new(1),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn lock_for_enqueue(&self) -> EnqueueGuard<'_> {
        EnqueueGuard {
            state: self.state.write(),
            queue_length: self.queue_length,
        }
    }

    pub fn enqueue(&self, event: ManagedNodeEvent) {
        self.lock_for_enqueue().enqueue(event);
    }

    pub fn snapshot_lock(&self) -> SnapshotGuard<'_> {
        SnapshotGuard {
            _state: self.state.read(),
        }
    }

    /// Locations this client currently holds events for.
    pub fn locations(&self) -> Vec<Location> {
        self.state.read().queues.keys().copied().collect()
    }

    /// Number of events retained for `location`.
    pub fn retained(&self, location: &Location) -> usize {
        self.state
            .read()
            .queues
            .get(location)
            .map_or(0, NodeEventQueue::len)
    }

    pub fn is_watching(&self) -> bool {
        self.state
            .read()
            .watcher
            .as_ref()
            .is_some_and(|w| !w.mailbox.is_closed())
    }

    /// Start streaming events to `out`.
    ///
    /// Buffered events newer than `resource_versions` are replayed first,
    /// then live events follow on the same channel until `stop` fires or
    /// `out` is closed. Replay collection and watcher installation happen
    /// under the exclusive state lock, so no event falls between them.
    ///
    /// Must be called from within a tokio runtime.
    pub fn watch(
        self: &Arc<Self>,
        resource_versions: &ResourceVersionMap,
        out: mpsc::Sender<NodeEvent>,
        stop: oneshot::Receiver<()>,
    ) -> Result<()> {
        let mut state = self.state.write();
        if state
            .watcher
            .as_ref()
            .is_some_and(|w| !w.mailbox.is_closed())
        {
            return Err(Error::AlreadyWatching(self.client_id.clone()));
        }

        let mut replay = Vec::new();
        for (location, rv) in resource_versions.iter() {
            let queue = state.queues.get(&location).ok_or_else(|| Error::LocationNotWatched {
                client_id: self.client_id.clone(),
                location,
            })?;
            replay.extend(queue.events_since_resource_version(rv)?);
        }

        let id = self.next_watch_id.fetch_add(1, Ordering::Relaxed);
        // Bounded by the retention window so a stalled watcher pins no
        // more than the ring buffers already hold.
        let capacity = self.queue_length.max(replay.len()).max(1);
        let (mailbox, inbox) = mpsc::channel(capacity);
        let replayed = replay.len();
        for event in replay {
            // inbox is alive and has room for the whole replay.
            let _ = mailbox.try_send(event);
        }
        state.watcher = Some(Watcher { id, mailbox });
        drop(state);

        debug!(client_id = %self.client_id, watch_id = id, replayed, "watch started");
        tokio::spawn(forward(Arc::clone(self), id, inbox, out, stop));
        Ok(())
    }

    fn clear_watcher(&self, id: u64) {
        let mut state = self.state.write();
        if state.watcher.as_ref().is_some_and(|w| w.id == id) {
            state.watcher = None;
        }
    }
}

/// Single consumer draining one watcher's mailbox into the caller's channel.
///
/// A slow consumer only backs up this task, never the ingestion path.
async fn forward(
    queue: Arc<ClientEventQueue>,
    id: u64,
    mut inbox: mpsc::Receiver<ManagedNodeEvent>,
    out: mpsc::Sender<NodeEvent>,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        let event = tokio::select! {
            _ = &mut stop => break,
            event = inbox.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let mut event = event.into_event();
        event.set_checkpoint(Checkpoint::DistributorSending);
        tokio::select! {
            _ = &mut stop => break,
            sent = out.send(event) => {
                if sent.is_err() {
                    warn!(client_id = %queue.client_id, watch_id = id, "watch receiver dropped");
                    break;
                }
            }
        }
    }

    queue.clear_watcher(id);
    debug!(client_id = %queue.client_id, watch_id = id, "watch stopped");
}
