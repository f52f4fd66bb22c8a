//! Error types for the core library.

use crate::location::Location;

/// Result type alias for the core library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the core library.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The event queue holds no events yet.
    #[error("event queue is empty")]
    EmptyEventQueue,

    /// The requested resource version has already been evicted from the
    /// retained window. Callers must re-list.
    #[error("requested resource version {requested} is older than the retained window (oldest {oldest})")]
    ResourceVersionTooOld {
        /// Version the caller asked to resume from.
        requested: u64,
        /// Oldest version still held by the queue.
        oldest: u64,
    },

    /// No retained event is newer than the requested version.
    ///
    /// This is a sentinel: the caller is already current and there is
    /// nothing to replay.
    #[error("end of event queue")]
    EndOfEventQueue,

    /// A logical index outside `[start, end]` was requested.
    #[error("event queue index {index} out of range [{start}, {end}]")]
    IndexOutOfRange {
        /// Requested logical index.
        index: usize,
        /// First retained logical index.
        start: usize,
        /// One past the last retained logical index.
        end: usize,
    },

    /// Region / partition pair is not part of the configured topology.
    #[error("unknown location: region {region}, partition {partition}")]
    UnknownLocation {
        /// Raw region value.
        region: i32,
        /// Raw resource partition value.
        partition: i32,
    },

    /// A resource version string could not be parsed as an unsigned integer.
    #[error("invalid resource version {0:?}")]
    InvalidResourceVersion(String),

    /// A region or partition name is not in the naming table.
    #[error("unknown location name {0:?}")]
    UnknownLocationName(String),

    /// Invalid topology parameters.
    #[error("invalid topology: {0}")]
    Topology(String),

    /// A watch is already active for this client.
    #[error("client {0} already has an active watcher")]
    AlreadyWatching(String),

    /// A watch requested a location the client receives no events for.
    #[error("client {client_id} is not subscribed to location {location}")]
    LocationNotWatched {
        /// Client that issued the watch.
        client_id: String,
        /// Location that is not part of the client's queues.
        location: Location,
    },
}

impl Error {
    /// True for the "nothing to replay" sentinel.
    pub fn is_end_of_queue(&self) -> bool {
        matches!(self, Error::EndOfEventQueue)
    }
}
