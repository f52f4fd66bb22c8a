//! Ring positions and virtual store routing.

use crate::ring::ring::RingArc;
use crate::token::HashToken;

/// Where a node lands on the ring.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RingPosition {
    /// Slot key inside the owning virtual store.
    pub token: HashToken,
    /// Position in degrees, inside the node's location arc.
    pub degrees: f64,
}

impl RingPosition {
    /// Place `node_id` inside `arc`.
    ///
    /// `degrees = lower + normalized(hash(id)) * width`
    pub fn locate(node_id: &str, arc: RingArc) -> Self {
        let token = HashToken::from_key(node_id);
        Self {
            token,
            degrees: arc.lower + token.normalized() * arc.width(),
        }
    }
}

/// Maps ring positions to dense virtual store indexes.
///
/// Stores for location `l` occupy indexes `[l * per_location, (l + 1) * per_location)`.
#[derive(Clone, Copy, Debug)]
pub struct VirtualRouter {
    per_location: usize,
}

impl VirtualRouter {
    pub fn new(virtual_nodes_per_location: usize) -> Self {
        Self {
            per_location: virtual_nodes_per_location,
        }
    }

    pub fn per_location(&self) -> usize {
        self.per_location
    }

    /// Index of the virtual store owning `position`.
    ///
    /// Floor division by the store granularity, clamped into the location's
    /// own index range so that rounding at the arc's upper edge never spills
    /// into a neighbour.
    pub fn route(&self, location_index: usize, arc: RingArc, position: &RingPosition) -> usize {
        let granularity = arc.width() / self.per_location as f64;
        let offset = ((position.degrees - arc.lower) / granularity).floor();
        let local = if offset <= 0.0 {
            0
        } else {
            (offset as usize).min(self.per_location - 1)
        };
        location_index * self.per_location + local
    }
}
