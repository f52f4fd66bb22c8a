//! The 360 degree ring.
//!
//! Every location owns a fixed arc of the ring. Nodes are hashed into
//! their location's arc, and the arc is cut into equally wide virtual
//! stores, the unit of allocation to clients.

pub mod position;
pub mod ring;

pub use position::{RingPosition, VirtualRouter};
pub use ring::{LocationRing, RingArc, RING_DEGREES};
