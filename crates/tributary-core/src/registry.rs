//! Bidirectional association between Rust event types and [`EventType`]s.
//!
//! The registry is populated once during startup and read concurrently
//! afterwards; share it behind an `Arc` once it is complete.

use std::any::TypeId;
use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::error::{AssociationConflict, RegistryError};
use crate::event::{Event, EventPayload, EventType, EventTypeId};

type SerializeFn = fn(&EventPayload) -> Result<Value, RegistryError>;
type DeserializeFn = fn(&Value) -> Result<EventPayload, RegistryError>;

/// A registered type and the JSON conversions for its values.
#[derive(Debug, Clone)]
struct Association {
    event_type: EventType,
    type_name: &'static str,
    serialize: SerializeFn,
    deserialize: DeserializeFn,
}

/// A Rust type known to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssociatedType {
    /// The `TypeId` of the associated type.
    pub type_id: TypeId,
    /// The Rust type name, for diagnostics.
    pub type_name: &'static str,
}

/// Registry mapping event value types to their wire identity.
#[derive(Debug, Default)]
pub struct EventTypeRegistry {
    by_type: HashMap<TypeId, Association>,
    by_id: HashMap<EventTypeId, TypeId>,
}

impl EventTypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates `E` with `event_type`.
    ///
    /// Re-associating the same pair is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::MismatchedEventType` if `E` declares a different
    /// event type, and `RegistryError::ConflictingAssociation` if `E` or the
    /// event type id is already bound elsewhere.
    pub fn associate<E: Event>(&mut self, event_type: EventType) -> Result<(), RegistryError> {
        if let Some(declared) = E::declared_event_type() {
            if !declared.matches_exactly(&event_type) {
                return Err(RegistryError::MismatchedEventType {
                    type_name: std::any::type_name::<E>(),
                    declared,
                    requested: event_type,
                });
            }
        }
        self.insert(TypeId::of::<E>(), Association::of::<E>(event_type))
    }

    /// Associates `E` with the event type declared by its marker.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::MissingEventTypeMarker` if `E` has no marker,
    /// and `RegistryError::ConflictingAssociation` on conflicts.
    pub fn associate_declared<E: Event>(&mut self) -> Result<EventType, RegistryError> {
        let event_type =
            E::declared_event_type().ok_or_else(|| RegistryError::MissingEventTypeMarker {
                type_name: std::any::type_name::<E>(),
            })?;
        self.insert(TypeId::of::<E>(), Association::of::<E>(event_type.clone()))?;
        Ok(event_type)
    }

    fn insert(&mut self, type_id: TypeId, association: Association) -> Result<(), RegistryError> {
        if let Some(existing) = self.by_type.get(&type_id) {
            if existing.event_type == association.event_type {
                return Ok(());
            }
            return Err(RegistryError::ConflictingAssociation {
                type_name: association.type_name,
                event_type: association.event_type,
                conflict: AssociationConflict::TypeBoundToOtherEventType(
                    existing.event_type.clone(),
                ),
            });
        }

        if let Some(other) = self.by_id.get(&association.event_type.id()) {
            let other_name = self
                .by_type
                .get(other)
                .map_or("<unknown>", |entry| entry.type_name);
            return Err(RegistryError::ConflictingAssociation {
                type_name: association.type_name,
                event_type: association.event_type,
                conflict: AssociationConflict::EventTypeBoundToOtherType(other_name),
            });
        }

        debug!(
            event_type = %association.event_type,
            type_name = association.type_name,
            "associated event type"
        );
        self.by_id.insert(association.event_type.id(), type_id);
        self.by_type.insert(type_id, association);
        Ok(())
    }

    /// Returns the event type associated with `E`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotAssociated` if `E` is unknown.
    pub fn event_type_for<E: Event>(&self) -> Result<&EventType, RegistryError> {
        self.event_type_for_type_id(TypeId::of::<E>())
            .ok_or_else(|| RegistryError::NotAssociated {
                type_name: std::any::type_name::<E>(),
            })
    }

    /// Returns the event type associated with the type behind `type_id`.
    #[must_use]
    pub fn event_type_for_type_id(&self, type_id: TypeId) -> Option<&EventType> {
        self.by_type.get(&type_id).map(|entry| &entry.event_type)
    }

    /// Returns the event type of the value inside `payload`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotAssociated` if the payload type is unknown.
    pub fn event_type_of(&self, payload: &EventPayload) -> Result<&EventType, RegistryError> {
        self.event_type_for_type_id(payload.type_id())
            .ok_or(RegistryError::NotAssociated {
                type_name: payload.type_name(),
            })
    }

    /// Returns the type associated with `event_type`, matching id and generation.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NoTypeForEventType` if nothing is associated.
    pub fn type_for(&self, event_type: &EventType) -> Result<AssociatedType, RegistryError> {
        self.by_id
            .get(&event_type.id())
            .and_then(|type_id| {
                self.by_type
                    .get(type_id)
                    .filter(|entry| entry.event_type == *event_type)
                    .map(|entry| AssociatedType {
                        type_id: *type_id,
                        type_name: entry.type_name,
                    })
            })
            .ok_or_else(|| RegistryError::NoTypeForEventType(event_type.clone()))
    }

    /// Returns `true` if `E` is associated.
    #[must_use]
    pub fn has_type<E: Event>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<E>())
    }

    /// Returns `true` if a type is associated with `event_type`.
    #[must_use]
    pub fn has_event_type(&self, event_type: &EventType) -> bool {
        self.type_for(event_type).is_ok()
    }

    /// Converts `payload` into its event type and JSON content.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotAssociated` if the payload type is unknown
    /// and `RegistryError::Serialization` if serialization fails.
    pub fn serialize(&self, payload: &EventPayload) -> Result<(EventType, Value), RegistryError> {
        let entry = self
            .by_type
            .get(&payload.type_id())
            .ok_or(RegistryError::NotAssociated {
                type_name: payload.type_name(),
            })?;
        let content = (entry.serialize)(payload)?;
        Ok((entry.event_type.clone(), content))
    }

    /// Converts JSON content of `event_type` back into a typed payload.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NoTypeForEventType` if nothing is associated and
    /// `RegistryError::Serialization` if the content does not deserialize.
    pub fn deserialize(
        &self,
        event_type: &EventType,
        content: &Value,
    ) -> Result<EventPayload, RegistryError> {
        let associated = self.type_for(event_type)?;
        let entry = self
            .by_type
            .get(&associated.type_id)
            .ok_or_else(|| RegistryError::NoTypeForEventType(event_type.clone()))?;
        (entry.deserialize)(content)
    }

    /// Iterates over all associations as `(type name, event type)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &EventType)> {
        self.by_type
            .values()
            .map(|entry| (entry.type_name, &entry.event_type))
    }

    /// Returns the number of associations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    /// Returns `true` if nothing is associated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

impl Association {
    fn of<E: Event>(event_type: EventType) -> Self {
        Self {
            event_type,
            type_name: std::any::type_name::<E>(),
            serialize: serialize_as::<E>,
            deserialize: deserialize_as::<E>,
        }
    }
}

fn serialize_as<E: Event>(payload: &EventPayload) -> Result<Value, RegistryError> {
    let event = payload
        .downcast_ref::<E>()
        .ok_or(RegistryError::NotAssociated {
            type_name: payload.type_name(),
        })?;
    serde_json::to_value(event).map_err(|source| RegistryError::Serialization {
        type_name: std::any::type_name::<E>(),
        source,
    })
}

fn deserialize_as<E: Event>(content: &Value) -> Result<EventPayload, RegistryError> {
    serde_json::from_value::<E>(content.clone())
        .map(EventPayload::new)
        .map_err(|source| RegistryError::Serialization {
            type_name: std::any::type_name::<E>(),
            source,
        })
}
