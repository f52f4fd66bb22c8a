//! Error types for the resource distributor.

use thiserror::Error;

/// Result type alias for distributor operations.
pub type Result<T> = std::result::Result<T, DistributorError>;

/// Errors returned to callers of the distributor.
///
/// Capacity and protocol errors indicate a caller mistake and are never
/// retried internally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistributorError {
    /// Requested host number is not above the configured minimum.
    #[error("requested host number {requested} must be more than {minimal}")]
    HostRequestLessThanMinimal { requested: usize, minimal: usize },

    /// Requested host number exceeds every host the distributor knows.
    #[error("requested host number {requested} exceeds total host number {total}")]
    HostRequestExceedLimit { requested: usize, total: usize },

    /// Not enough unassigned hosts left to satisfy the request.
    #[error("requested host number {requested} exceeds free capacity")]
    HostRequestExceedCapacity { requested: usize },

    /// Generated client id is already registered.
    #[error("client id {0} already exists")]
    ClientIdExisted(String),

    /// No client with this id is registered.
    #[error("client {0} not found")]
    ClientNotFound(String),

    /// A required watch argument was not supplied.
    #[error("missing watch argument: {0}")]
    MissingWatchArgument(&'static str),

    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Error from the node store or event queues.
    #[error(transparent)]
    Core(#[from] corelib::Error),
}
