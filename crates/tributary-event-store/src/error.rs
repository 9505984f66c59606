//! Errors returned by the event store facade.

use thiserror::Error;
use tributary_core::error::{EventSequenceError, RegistryError, RuntimeError};
use tributary_core::identity::{AggregateRootId, AggregateRootVersion, EventSourceId};

/// Failures of commit and fetch operations.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// The aggregate root was not at the expected version. The caller decides
    /// whether to refetch and retry.
    #[error(
        "concurrency conflict on aggregate root {aggregate_root_id} for event source {event_source}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        /// The aggregate root.
        aggregate_root_id: AggregateRootId,
        /// The event source.
        event_source: EventSourceId,
        /// The version the commit expected.
        expected: AggregateRootVersion,
        /// The version the Runtime holds.
        actual: AggregateRootVersion,
    },

    /// The Runtime rejected the request.
    #[error("request rejected by the runtime: {0}")]
    Rejected(String),

    /// The Runtime could not be reached.
    #[error("runtime unavailable: {0}")]
    Unavailable(String),

    /// The events to commit break sequence invariants.
    #[error("invalid events: {0}")]
    InvalidEvents(#[source] EventSequenceError),

    /// The Runtime answered with events that break sequence invariants.
    #[error("invalid runtime response: {0}")]
    InvalidResponse(#[source] EventSequenceError),

    /// An event could not be converted through the registry.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The operation was cancelled before the Runtime answered.
    #[error("operation was cancelled")]
    Cancelled,
}

impl From<RuntimeError> for EventStoreError {
    fn from(error: RuntimeError) -> Self {
        match error {
            RuntimeError::ConcurrencyConflict {
                aggregate_root_id,
                event_source,
                expected,
                actual,
            } => Self::ConcurrencyConflict {
                aggregate_root_id,
                event_source,
                expected,
                actual,
            },
            RuntimeError::Rejected(reason) => Self::Rejected(reason),
            RuntimeError::Unavailable(reason) => Self::Unavailable(reason),
            RuntimeError::InvalidResponse(error) => Self::InvalidResponse(error),
        }
    }
}
