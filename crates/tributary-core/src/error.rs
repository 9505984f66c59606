//! Error types for event identities, the registry, event sequences and the
//! Runtime boundary.

use std::fmt;

use thiserror::Error;

use crate::event::EventType;
use crate::identity::{
    AggregateRootId, AggregateRootVersion, EventLogSequenceNumber, EventSourceId,
};

/// Errors raised while constructing event type identities.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventTypeError {
    /// Generations start at 1.
    #[error("event type generation must be at least 1, got {0}")]
    InvalidGeneration(u32),
}

/// The side of an association that is already taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociationConflict {
    /// The type is already bound to another event type.
    TypeBoundToOtherEventType(EventType),
    /// The event type id is already bound to another type.
    EventTypeBoundToOtherType(&'static str),
}

impl fmt::Display for AssociationConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeBoundToOtherEventType(existing) => {
                write!(f, "the type is already associated with {existing}")
            }
            Self::EventTypeBoundToOtherType(type_name) => {
                write!(f, "the event type id is already associated with {type_name}")
            }
        }
    }
}

/// Errors raised by the event type registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// One side of the requested association is bound elsewhere.
    #[error("cannot associate {type_name} with {event_type}: {conflict}")]
    ConflictingAssociation {
        /// The type being associated.
        type_name: &'static str,
        /// The requested event type.
        event_type: EventType,
        /// What the association collides with.
        conflict: AssociationConflict,
    },

    /// An explicit event type disagrees with the type's declarative marker.
    #[error("{type_name} declares event type {declared} but was associated with {requested}")]
    MismatchedEventType {
        /// The type being associated.
        type_name: &'static str,
        /// The event type from the marker.
        declared: EventType,
        /// The event type passed explicitly.
        requested: EventType,
    },

    /// The type carries no declarative marker.
    #[error("{type_name} does not declare an event type")]
    MissingEventTypeMarker {
        /// The type being associated.
        type_name: &'static str,
    },

    /// No event type is associated with the type.
    #[error("{type_name} is not associated with an event type")]
    NotAssociated {
        /// The type that was looked up.
        type_name: &'static str,
    },

    /// No type is associated with the event type.
    #[error("no type is associated with event type {0}")]
    NoTypeForEventType(EventType),

    /// Event content could not be converted to or from JSON.
    #[error("could not convert {type_name} content: {source}")]
    Serialization {
        /// The type being converted.
        type_name: &'static str,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

/// Invariant violations in event sequences.
///
/// These indicate a broken contract between the SDK and its caller or the
/// Runtime, and are reported at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventSequenceError {
    /// The event content is JSON `null`.
    #[error("event of type {event_type} has null content")]
    EventCannotBeNull {
        /// Type of the rejected event.
        event_type: EventType,
    },

    /// The event source id is empty.
    #[error("event source id cannot be empty")]
    EventSourceCannotBeEmpty,

    /// An event in an aggregate batch belongs to another event source.
    #[error("event was applied to event source {actual}, expected {expected}")]
    EventWasAppliedToOtherEventSource {
        /// The batch's event source.
        expected: EventSourceId,
        /// The event's event source.
        actual: EventSourceId,
    },

    /// An event in an aggregate batch was applied by another aggregate root.
    #[error("event was applied by aggregate root {actual}, expected {expected}")]
    EventWasAppliedByOtherAggregateRoot {
        /// The batch's aggregate root.
        expected: AggregateRootId,
        /// The event's aggregate root.
        actual: AggregateRootId,
    },

    /// Aggregate root versions must increase by one per event.
    #[error("aggregate root version {actual} does not follow {previous}")]
    AggregateRootVersionIsOutOfOrder {
        /// Version of the preceding event.
        previous: AggregateRootVersion,
        /// Version of the offending event.
        actual: AggregateRootVersion,
    },

    /// Event log sequence numbers must strictly increase.
    #[error("event log sequence number {actual} does not follow {previous}")]
    EventLogSequenceNumberIsOutOfOrder {
        /// Sequence number of the preceding event.
        previous: EventLogSequenceNumber,
        /// Sequence number of the offending event.
        actual: EventLogSequenceNumber,
    },

    /// The declared aggregate root version is behind the events it carries.
    #[error("aggregate root version {declared} is behind the last event version {last}")]
    AggregateRootVersionBehindEvents {
        /// The version given for the batch.
        declared: AggregateRootVersion,
        /// Version of the last event in the batch.
        last: AggregateRootVersion,
    },
}

/// Failures reported by the Runtime for commit and fetch requests.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The aggregate root was not at the expected version.
    #[error(
        "concurrency conflict on aggregate root {aggregate_root_id} for event source {event_source}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        /// The aggregate root that had the conflict.
        aggregate_root_id: AggregateRootId,
        /// The event source the events were applied to.
        event_source: EventSourceId,
        /// The expected version.
        expected: AggregateRootVersion,
        /// The version the Runtime holds.
        actual: AggregateRootVersion,
    },

    /// The Runtime processed the request and rejected it.
    #[error("request rejected by the runtime: {0}")]
    Rejected(String),

    /// The Runtime could not be reached.
    #[error("runtime unavailable: {0}")]
    Unavailable(String),

    /// The Runtime answered with events that break sequence invariants.
    #[error("invalid runtime response: {0}")]
    InvalidResponse(#[from] EventSequenceError),
}
