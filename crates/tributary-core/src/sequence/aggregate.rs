use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::EventSequenceError;
use crate::event::EventType;
use crate::execution::ExecutionContext;
use crate::identity::{
    AggregateRootId, AggregateRootVersion, EventLogSequenceNumber, EventSourceId,
};

use super::ensure_content;

/// An event applied by an aggregate root, not yet committed.
#[derive(Debug, Clone, PartialEq)]
pub struct UncommittedAggregateEvent {
    /// Wire identity of the event.
    pub event_type: EventType,
    /// Serialized event content.
    pub content: Value,
    /// Whether the event is published to other microservices.
    pub is_public: bool,
}

/// Events applied by one aggregate root instance, to be committed together.
///
/// `expected_aggregate_root_version` is the optimistic-concurrency
/// precondition the Runtime checks at commit time.
#[derive(Debug, Clone, PartialEq)]
pub struct UncommittedAggregateEvents {
    event_source: EventSourceId,
    aggregate_root_id: AggregateRootId,
    expected_aggregate_root_version: AggregateRootVersion,
    events: Vec<UncommittedAggregateEvent>,
}

impl UncommittedAggregateEvents {
    /// Creates an empty batch for one aggregate root instance.
    ///
    /// # Errors
    ///
    /// Returns `EventSequenceError::EventSourceCannotBeEmpty` for an empty source.
    pub fn new(
        event_source: EventSourceId,
        aggregate_root_id: AggregateRootId,
        expected_aggregate_root_version: AggregateRootVersion,
    ) -> Result<Self, EventSequenceError> {
        if event_source.is_empty() {
            return Err(EventSequenceError::EventSourceCannotBeEmpty);
        }
        Ok(Self {
            event_source,
            aggregate_root_id,
            expected_aggregate_root_version,
            events: Vec::new(),
        })
    }

    /// Appends an applied event.
    ///
    /// # Errors
    ///
    /// Returns `EventSequenceError::EventCannotBeNull` for `null` content.
    pub fn push(&mut self, event: UncommittedAggregateEvent) -> Result<(), EventSequenceError> {
        ensure_content(&event.event_type, &event.content)?;
        self.events.push(event);
        Ok(())
    }

    /// The event source the events are applied to.
    #[must_use]
    pub fn event_source(&self) -> &EventSourceId {
        &self.event_source
    }

    /// The aggregate root that applied the events.
    #[must_use]
    pub fn aggregate_root_id(&self) -> AggregateRootId {
        self.aggregate_root_id
    }

    /// The version the aggregate root is expected to be at before the commit.
    #[must_use]
    pub fn expected_aggregate_root_version(&self) -> AggregateRootVersion {
        self.expected_aggregate_root_version
    }

    /// Returns the events in order.
    #[must_use]
    pub fn as_slice(&self) -> &[UncommittedAggregateEvent] {
        &self.events
    }

    /// Iterates over the events in order.
    pub fn iter(&self) -> std::slice::Iter<'_, UncommittedAggregateEvent> {
        self.events.iter()
    }

    /// Returns the number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if no events were applied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// An event committed by an aggregate root.
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedAggregateEvent {
    /// Position of the event in the event log.
    pub sequence_number: EventLogSequenceNumber,
    /// When the event was committed.
    pub occurred: DateTime<Utc>,
    /// The event source the event was applied to.
    pub event_source: EventSourceId,
    /// The aggregate root that applied the event.
    pub aggregate_root_id: AggregateRootId,
    /// The aggregate root version after applying this event.
    pub aggregate_root_version: AggregateRootVersion,
    /// The execution context the event was committed in.
    pub execution_context: ExecutionContext,
    /// Wire identity of the event.
    pub event_type: EventType,
    /// Serialized event content.
    pub content: Value,
    /// Whether the event is published to other microservices.
    pub is_public: bool,
}

/// Events committed by one aggregate root instance, in application order.
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedAggregateEvents {
    event_source: EventSourceId,
    aggregate_root_id: AggregateRootId,
    aggregate_root_version: AggregateRootVersion,
    events: Vec<CommittedAggregateEvent>,
}

impl CommittedAggregateEvents {
    /// Builds the sequence from a contiguous run of the aggregate's stream;
    /// the aggregate root version is that of the last event, or
    /// [`AggregateRootVersion::INITIAL`] when there are none.
    ///
    /// # Errors
    ///
    /// Returns an `EventSequenceError` if any event belongs to another event
    /// source or aggregate root, has `null` content, or is out of order.
    /// Versions must step by exactly one.
    pub fn new(
        event_source: EventSourceId,
        aggregate_root_id: AggregateRootId,
        events: Vec<CommittedAggregateEvent>,
    ) -> Result<Self, EventSequenceError> {
        validate(&event_source, aggregate_root_id, &events, VersionRule::Consecutive)?;
        let aggregate_root_version = events
            .last()
            .map_or(AggregateRootVersion::INITIAL, |event| {
                event.aggregate_root_version
            });
        Ok(Self {
            event_source,
            aggregate_root_id,
            aggregate_root_version,
            events,
        })
    }

    /// Builds the sequence with an explicit aggregate root version, used when
    /// the events are a filtered subset of the aggregate's stream. Versions
    /// must strictly increase but may skip.
    ///
    /// # Errors
    ///
    /// As [`CommittedAggregateEvents::new`], plus
    /// `EventSequenceError::AggregateRootVersionBehindEvents` if
    /// `aggregate_root_version` is lower than the last event's version.
    pub fn with_version(
        event_source: EventSourceId,
        aggregate_root_id: AggregateRootId,
        aggregate_root_version: AggregateRootVersion,
        events: Vec<CommittedAggregateEvent>,
    ) -> Result<Self, EventSequenceError> {
        validate(&event_source, aggregate_root_id, &events, VersionRule::Increasing)?;
        if let Some(last) = events.last() {
            if aggregate_root_version < last.aggregate_root_version {
                return Err(EventSequenceError::AggregateRootVersionBehindEvents {
                    declared: aggregate_root_version,
                    last: last.aggregate_root_version,
                });
            }
        }
        Ok(Self {
            event_source,
            aggregate_root_id,
            aggregate_root_version,
            events,
        })
    }

    /// The event source the events were applied to.
    #[must_use]
    pub fn event_source(&self) -> &EventSourceId {
        &self.event_source
    }

    /// The aggregate root that applied the events.
    #[must_use]
    pub fn aggregate_root_id(&self) -> AggregateRootId {
        self.aggregate_root_id
    }

    /// The aggregate root version after the events.
    #[must_use]
    pub fn aggregate_root_version(&self) -> AggregateRootVersion {
        self.aggregate_root_version
    }

    /// Returns the events in order.
    #[must_use]
    pub fn as_slice(&self) -> &[CommittedAggregateEvent] {
        &self.events
    }

    /// Iterates over the events in order.
    pub fn iter(&self) -> std::slice::Iter<'_, CommittedAggregateEvent> {
        self.events.iter()
    }

    /// Returns the number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if there are no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl IntoIterator for CommittedAggregateEvents {
    type Item = CommittedAggregateEvent;
    type IntoIter = std::vec::IntoIter<CommittedAggregateEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

impl<'a> IntoIterator for &'a CommittedAggregateEvents {
    type Item = &'a CommittedAggregateEvent;
    type IntoIter = std::slice::Iter<'a, CommittedAggregateEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VersionRule {
    /// Each version is the previous one plus one.
    Consecutive,
    /// Each version is greater than the previous one.
    Increasing,
}

impl VersionRule {
    fn allows(self, previous: AggregateRootVersion, actual: AggregateRootVersion) -> bool {
        match self {
            Self::Consecutive => previous.checked_next() == Some(actual),
            Self::Increasing => actual > previous,
        }
    }
}

fn validate(
    event_source: &EventSourceId,
    aggregate_root_id: AggregateRootId,
    events: &[CommittedAggregateEvent],
    versions: VersionRule,
) -> Result<(), EventSequenceError> {
    let mut previous: Option<&CommittedAggregateEvent> = None;
    for event in events {
        if event.event_source != *event_source {
            return Err(EventSequenceError::EventWasAppliedToOtherEventSource {
                expected: event_source.clone(),
                actual: event.event_source.clone(),
            });
        }
        if event.aggregate_root_id != aggregate_root_id {
            return Err(EventSequenceError::EventWasAppliedByOtherAggregateRoot {
                expected: aggregate_root_id,
                actual: event.aggregate_root_id,
            });
        }
        ensure_content(&event.event_type, &event.content)?;
        if let Some(previous) = previous {
            if !versions.allows(previous.aggregate_root_version, event.aggregate_root_version) {
                return Err(EventSequenceError::AggregateRootVersionIsOutOfOrder {
                    previous: previous.aggregate_root_version,
                    actual: event.aggregate_root_version,
                });
            }
            if event.sequence_number <= previous.sequence_number {
                return Err(EventSequenceError::EventLogSequenceNumberIsOutOfOrder {
                    previous: previous.sequence_number,
                    actual: event.sequence_number,
                });
            }
        }
        previous = Some(event);
    }
    Ok(())
}
