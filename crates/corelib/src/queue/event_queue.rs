//! Per-location circular event buffer.
//!
//! `start` and `end` are logical positions that only ever grow; the
//! physical slot of logical index `i` is `i % capacity`. When the buffer
//! is full, enqueue evicts the oldest event by advancing `start`.

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::event::ManagedNodeEvent;

/// Default number of events retained per location.
pub const LENGTH_OF_NODE_EVENT_QUEUE: usize = 10_000;

#[derive(Debug)]
struct RingBuffer {
    events: Vec<ManagedNodeEvent>,
    capacity: usize,
    start: usize,
    end: usize,
}

impl RingBuffer {
    #[inline]
    fn at(&self, index: usize) -> &ManagedNodeEvent {
        &self.events[index % self.capacity]
    }

    fn push(&mut self, event: ManagedNodeEvent) {
        if self.end - self.start == self.capacity {
            self.start += 1;
        }
        let slot = self.end % self.capacity;
        if slot < self.events.len() {
            self.events[slot] = event;
        } else {
            self.events.push(event);
        }
        self.end += 1;
    }

    fn copy_from(&self, index: usize) -> Result<Vec<ManagedNodeEvent>> {
        if index < self.start || index > self.end {
            return Err(Error::IndexOutOfRange {
                index,
                start: self.start,
                end: self.end,
            });
        }
        Ok((index..self.end).map(|i| self.at(i).clone()).collect())
    }

    /// Smallest logical index whose event version is greater than `rv`.
    fn index_since(&self, rv: u64) -> Result<usize> {
        if self.start == self.end {
            return Err(Error::EmptyEventQueue);
        }
        let oldest = self.at(self.start).resource_version();
        if oldest > rv {
            return Err(Error::ResourceVersionTooOld {
                requested: rv,
                oldest,
            });
        }

        let (mut lo, mut hi) = (self.start, self.end);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.at(mid).resource_version() > rv {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }

        if lo == self.end {
            Err(Error::EndOfEventQueue)
        } else {
            Ok(lo)
        }
    }
}

/// Fixed-capacity event buffer for one location.
#[derive(Debug)]
pub struct NodeEventQueue {
    inner: RwLock<RingBuffer>,
}

impl NodeEventQueue {
    pub fn new() -> Self {
        Self::with_capacity(LENGTH_OF_NODE_EVENT_QUEUE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: RwLock::new(RingBuffer {
                events: Vec::with_capacity(capacity.min(1024)),
                capacity,
                start: 0,
                end: 0,
            }),
        }
    }

    /// Append `event`, evicting the oldest one when full. O(1).
    pub fn enqueue(&self, event: ManagedNodeEvent) {
        self.inner.write().push(event);
    }

    /// Copies of every event in `[index, end)`.
    pub fn events_from_index(&self, index: usize) -> Result<Vec<ManagedNodeEvent>> {
        self.inner.read().copy_from(index)
    }

    /// Logical index of the first event with a version greater than `rv`.
    ///
    /// Fails with [`Error::ResourceVersionTooOld`] once `rv` has fallen out
    /// of the retained window and with the [`Error::EndOfEventQueue`]
    /// sentinel when nothing newer than `rv` is retained. O(log n).
    pub fn index_since_resource_version(&self, rv: u64) -> Result<usize> {
        self.inner.read().index_since(rv)
    }

    /// Copies of every retained event newer than `rv`, read under a single
    /// lock acquisition. An already-current `rv` yields an empty vector.
    pub fn events_since_resource_version(&self, rv: u64) -> Result<Vec<ManagedNodeEvent>> {
        let inner = self.inner.read();
        match inner.index_since(rv) {
            Ok(index) => inner.copy_from(index),
            Err(Error::EndOfEventQueue) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// First retained logical index.
    pub fn start(&self) -> usize {
        self.inner.read().start
    }

    /// One past the last logical index.
    pub fn end(&self) -> usize {
        self.inner.read().end
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read();
        inner.end - inner.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.read().capacity
    }
}

impl Default for NodeEventQueue {
    fn default() -> Self {
        Self::new()
    }
}
