use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::EventSequenceError;
use crate::event::EventType;
use crate::execution::ExecutionContext;
use crate::identity::{EventLogSequenceNumber, EventSourceId};

use super::ensure_content;

/// An event persisted in the event log.
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedEvent {
    /// Position of the event in the event log.
    pub sequence_number: EventLogSequenceNumber,
    /// When the event was committed.
    pub occurred: DateTime<Utc>,
    /// The event source the event was recorded against.
    pub event_source: EventSourceId,
    /// The execution context the event was committed in.
    pub execution_context: ExecutionContext,
    /// Wire identity of the event.
    pub event_type: EventType,
    /// Serialized event content.
    pub content: Value,
    /// Whether the event is published to other microservices.
    pub is_public: bool,
}

/// Committed events in strictly increasing event log order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommittedEvents {
    events: Vec<CommittedEvent>,
}

impl CommittedEvents {
    /// Builds the sequence from `events`.
    ///
    /// # Errors
    ///
    /// Returns `EventSequenceError::EventCannotBeNull` for `null` content and
    /// `EventSequenceError::EventLogSequenceNumberIsOutOfOrder` when sequence
    /// numbers do not strictly increase.
    pub fn new(
        events: impl IntoIterator<Item = CommittedEvent>,
    ) -> Result<Self, EventSequenceError> {
        let mut sequence = Self::default();
        for event in events {
            sequence.push(event)?;
        }
        Ok(sequence)
    }

    /// Appends an event after the current last one.
    ///
    /// # Errors
    ///
    /// See [`CommittedEvents::new`].
    pub fn push(&mut self, event: CommittedEvent) -> Result<(), EventSequenceError> {
        ensure_content(&event.event_type, &event.content)?;
        if let Some(previous) = self.events.last() {
            if event.sequence_number <= previous.sequence_number {
                return Err(EventSequenceError::EventLogSequenceNumberIsOutOfOrder {
                    previous: previous.sequence_number,
                    actual: event.sequence_number,
                });
            }
        }
        self.events.push(event);
        Ok(())
    }

    /// Returns the events in order.
    #[must_use]
    pub fn as_slice(&self) -> &[CommittedEvent] {
        &self.events
    }

    /// Iterates over the events in order.
    pub fn iter(&self) -> std::slice::Iter<'_, CommittedEvent> {
        self.events.iter()
    }

    /// Returns the number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if the sequence is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl IntoIterator for CommittedEvents {
    type Item = CommittedEvent;
    type IntoIter = std::vec::IntoIter<CommittedEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

impl<'a> IntoIterator for &'a CommittedEvents {
    type Item = &'a CommittedEvent;
    type IntoIter = std::slice::Iter<'a, CommittedEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    fn committed(sequence_number: u64) -> CommittedEvent {
        CommittedEvent {
            sequence_number: EventLogSequenceNumber(sequence_number),
            occurred: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
            event_source: EventSourceId::from("kitchen"),
            execution_context: ExecutionContext::default(),
            event_type: EventType::new(Uuid::from_u128(1)),
            content: json!({ "dish": "Taco" }),
            is_public: false,
        }
    }

    #[test]
    fn test_new_accepts_increasing_sequence_numbers_with_gaps() {
        let events = CommittedEvents::new(vec![committed(3), committed(4), committed(9)]).unwrap();

        assert_eq!(events.len(), 3);
        assert_eq!(events.as_slice()[2].sequence_number, EventLogSequenceNumber(9));
    }

    #[test]
    fn test_new_rejects_repeated_sequence_number() {
        let result = CommittedEvents::new(vec![committed(3), committed(3)]);

        assert_eq!(
            result.unwrap_err(),
            EventSequenceError::EventLogSequenceNumberIsOutOfOrder {
                previous: EventLogSequenceNumber(3),
                actual: EventLogSequenceNumber(3),
            }
        );
    }

    #[test]
    fn test_push_rejects_null_content() {
        let mut events = CommittedEvents::default();
        let mut event = committed(0);
        event.content = Value::Null;

        let result = events.push(event);

        assert!(matches!(result, Err(EventSequenceError::EventCannotBeNull { .. })));
    }
}
