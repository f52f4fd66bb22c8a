//! Hash tokens for placing nodes on the ring.
//!
//! A token is a uniform 64-bit hash of a node id. Routing is a pure
//! function of the token and the node's location, so concurrent callers
//! never need to coordinate to find a node's virtual store.

pub mod xxh3;

pub use xxh3::HashToken;
