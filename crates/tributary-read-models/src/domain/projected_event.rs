//! Events as seen by read model handlers.

use serde_json::Value;
use tributary_core::error::RegistryError;
use tributary_core::event::{Event, EventPayload, EventType};
use tributary_core::identity::PartitionId;
use tributary_core::registry::EventTypeRegistry;
use tributary_core::sequence::CommittedEvent;

use super::context::EventContext;

/// An event delivered to a read model.
///
/// Carries the wire identity and JSON content next to the typed payload, so
/// key selectors can read properties without knowing the payload type.
#[derive(Debug, Clone)]
pub struct ProjectedEvent {
    /// Wire identity of the event, used to look up the handler.
    pub event_type: EventType,
    /// The typed event value.
    pub payload: EventPayload,
    /// The serialized event content.
    pub content: Value,
    /// The event's commit context.
    pub context: EventContext,
}

impl ProjectedEvent {
    /// Creates a projected event from its parts without any checks.
    #[must_use]
    pub fn new(
        event_type: EventType,
        payload: EventPayload,
        content: Value,
        context: EventContext,
    ) -> Self {
        Self {
            event_type,
            payload,
            content,
            context,
        }
    }

    /// Creates a projected event from a typed event associated in `registry`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError` if `E` is not associated or does not serialize.
    pub fn from_event<E: Event>(
        registry: &EventTypeRegistry,
        event: E,
        context: EventContext,
    ) -> Result<Self, RegistryError> {
        let payload = EventPayload::new(event);
        let (event_type, content) = registry.serialize(&payload)?;
        Ok(Self::new(event_type, payload, content, context))
    }

    /// Creates a projected event from a committed event, deserializing its
    /// content into the associated type.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError` if nothing is associated with the event type or
    /// the content does not deserialize.
    pub fn from_committed(
        registry: &EventTypeRegistry,
        committed: &CommittedEvent,
        partition: PartitionId,
    ) -> Result<Self, RegistryError> {
        let payload = registry.deserialize(&committed.event_type, &committed.content)?;
        Ok(Self::new(
            committed.event_type.clone(),
            payload,
            committed.content.clone(),
            EventContext {
                sequence_number: committed.sequence_number,
                event_source: committed.event_source.clone(),
                partition,
                occurred: committed.occurred,
                execution_context: committed.execution_context.clone(),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use tributary_core::execution::ExecutionContext;
    use tributary_core::identity::{EventLogSequenceNumber, EventSourceId};
    use uuid::Uuid;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct OrderPlaced {
        order: String,
    }

    impl Event for OrderPlaced {}

    fn registry() -> EventTypeRegistry {
        let mut registry = EventTypeRegistry::new();
        registry
            .associate::<OrderPlaced>(EventType::new(Uuid::from_u128(42)))
            .unwrap();
        registry
    }

    #[test]
    fn test_from_committed_deserializes_the_payload() {
        // Arrange
        let registry = registry();
        let committed = CommittedEvent {
            sequence_number: EventLogSequenceNumber(9),
            occurred: Utc::now(),
            event_source: EventSourceId::from("order-1"),
            execution_context: ExecutionContext::default(),
            event_type: EventType::new(Uuid::from_u128(42)),
            content: json!({ "order": "order-1" }),
            is_public: false,
        };

        // Act
        let projected =
            ProjectedEvent::from_committed(&registry, &committed, PartitionId::default()).unwrap();

        // Assert
        assert_eq!(
            projected.payload.downcast_ref::<OrderPlaced>(),
            Some(&OrderPlaced {
                order: "order-1".to_owned()
            })
        );
        assert_eq!(projected.context.sequence_number, EventLogSequenceNumber(9));
        assert_eq!(projected.content, json!({ "order": "order-1" }));
    }

    #[test]
    fn test_from_event_fails_for_unassociated_type() {
        let registry = EventTypeRegistry::new();
        let context = EventContext {
            sequence_number: EventLogSequenceNumber(0),
            event_source: EventSourceId::from("order-1"),
            partition: PartitionId::default(),
            occurred: Utc::now(),
            execution_context: ExecutionContext::default(),
        };

        let result = ProjectedEvent::from_event(
            &registry,
            OrderPlaced {
                order: "order-1".to_owned(),
            },
            context,
        );

        assert!(matches!(result, Err(RegistryError::NotAssociated { .. })));
    }
}
