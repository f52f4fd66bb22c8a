//! XXH3-backed node token.

use xxhash_rust::xxh3::xxh3_64;

/// Uniform 64-bit hash of a node id.
///
/// Doubles as the slot key inside a virtual node store: two distinct ids
/// with equal tokens are a hash collision.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct HashToken(pub u64);

impl HashToken {
    /// Creates a token from a byte slice.
    #[inline]
    pub fn from_bytes(data: &[u8]) -> Self {
        HashToken(xxh3_64(data))
    }

    /// Creates a token from a node id.
    #[inline]
    pub fn from_key(key: &str) -> Self {
        Self::from_bytes(key.as_bytes())
    }

    /// Token scaled into `(0, 1]`.
    #[inline]
    pub fn normalized(&self) -> f64 {
        (self.0 as f64 + 1.0) / (u64::MAX as f64 + 1.0)
    }
}

impl std::fmt::Display for HashToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
