use serde_json::Value;

use crate::error::EventSequenceError;
use crate::event::EventType;
use crate::identity::EventSourceId;

use super::ensure_content;

/// An event that has not been committed to the event log yet.
#[derive(Debug, Clone, PartialEq)]
pub struct UncommittedEvent {
    /// The event source the event is recorded against.
    pub event_source: EventSourceId,
    /// Wire identity of the event.
    pub event_type: EventType,
    /// Serialized event content.
    pub content: Value,
    /// Whether the event is published to other microservices.
    pub is_public: bool,
}

/// A batch of events to commit in one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UncommittedEvents {
    events: Vec<UncommittedEvent>,
}

impl UncommittedEvents {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a batch from `events`, validating each one.
    ///
    /// # Errors
    ///
    /// Returns the first `EventSequenceError` found.
    pub fn from_events(
        events: impl IntoIterator<Item = UncommittedEvent>,
    ) -> Result<Self, EventSequenceError> {
        let mut batch = Self::new();
        for event in events {
            batch.push(event)?;
        }
        Ok(batch)
    }

    /// Appends an event.
    ///
    /// # Errors
    ///
    /// Returns `EventSequenceError::EventCannotBeNull` for `null` content and
    /// `EventSequenceError::EventSourceCannotBeEmpty` for an empty source.
    pub fn push(&mut self, event: UncommittedEvent) -> Result<(), EventSequenceError> {
        if event.event_source.is_empty() {
            return Err(EventSequenceError::EventSourceCannotBeEmpty);
        }
        ensure_content(&event.event_type, &event.content)?;
        self.events.push(event);
        Ok(())
    }

    /// Returns the events in order.
    #[must_use]
    pub fn as_slice(&self) -> &[UncommittedEvent] {
        &self.events
    }

    /// Iterates over the events in order.
    pub fn iter(&self) -> std::slice::Iter<'_, UncommittedEvent> {
        self.events.iter()
    }

    /// Returns the number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl IntoIterator for UncommittedEvents {
    type Item = UncommittedEvent;
    type IntoIter = std::vec::IntoIter<UncommittedEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

impl<'a> IntoIterator for &'a UncommittedEvents {
    type Item = &'a UncommittedEvent;
    type IntoIter = std::slice::Iter<'a, UncommittedEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
