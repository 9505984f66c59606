//! Event type identities and the application-facing event abstractions.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EventTypeError;

/// Unique identifier of an event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventTypeId(pub Uuid);

impl fmt::Display for EventTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Schema generation of an event type. Generations start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Generation(u32);

impl Generation {
    /// The first generation of every event type.
    pub const FIRST: Self = Self(1);

    /// Creates a generation.
    ///
    /// # Errors
    ///
    /// Returns `EventTypeError::InvalidGeneration` if `value` is 0.
    pub fn new(value: u32) -> Result<Self, EventTypeError> {
        if value == 0 {
            return Err(EventTypeError::InvalidGeneration(value));
        }
        Ok(Self(value))
    }

    /// Returns the raw generation number.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl Default for Generation {
    fn default() -> Self {
        Self::FIRST
    }
}

impl TryFrom<u32> for Generation {
    type Error = EventTypeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Generation> for u32 {
    fn from(value: Generation) -> Self {
        value.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Wire identity of an event kind.
///
/// Two event types are equal when their `id` and `generation` are equal; the
/// alias is descriptive only. Use [`EventType::matches_exactly`] to compare
/// aliases as well.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventType {
    id: EventTypeId,
    generation: Generation,
    alias: Option<String>,
}

impl EventType {
    /// Creates a first-generation event type without an alias.
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id: EventTypeId(id),
            generation: Generation::FIRST,
            alias: None,
        }
    }

    /// Creates an event type with an explicit generation.
    ///
    /// # Errors
    ///
    /// Returns `EventTypeError::InvalidGeneration` if `generation` is 0.
    pub fn with_generation(id: Uuid, generation: u32) -> Result<Self, EventTypeError> {
        Ok(Self {
            id: EventTypeId(id),
            generation: Generation::new(generation)?,
            alias: None,
        })
    }

    /// Returns a copy of this event type carrying `alias`.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Returns the event type id.
    #[must_use]
    pub fn id(&self) -> EventTypeId {
        self.id
    }

    /// Returns the generation.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Returns the alias, if any.
    #[must_use]
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Compares id, generation and alias.
    #[must_use]
    pub fn matches_exactly(&self, other: &Self) -> bool {
        self == other && self.alias == other.alias
    }
}

impl PartialEq for EventType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.generation == other.generation
    }
}

impl Eq for EventType {}

impl Hash for EventType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.generation.hash(state);
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{alias} ({}/{})", self.id, self.generation),
            None => write!(f, "{}/{}", self.id, self.generation),
        }
    }
}

/// Trait implemented by application event values.
///
/// Event content crosses the wire as JSON, so events are `serde` types.
pub trait Event: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The declarative event type marker for this type.
    ///
    /// Returning `Some` lets the registry associate the type without an
    /// explicit event type, and makes explicit associations that disagree
    /// with the marker fail.
    fn declared_event_type() -> Option<EventType> {
        None
    }
}

/// A type-erased event value, as handed to handlers and returned by them.
#[derive(Clone)]
pub struct EventPayload {
    value: Arc<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
}

impl EventPayload {
    /// Wraps an event value.
    #[must_use]
    pub fn new<E: Any + Send + Sync>(event: E) -> Self {
        Self {
            value: Arc::new(event),
            type_id: TypeId::of::<E>(),
            type_name: std::any::type_name::<E>(),
        }
    }

    /// Returns the `TypeId` of the wrapped value.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the Rust type name of the wrapped value.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns `true` if the wrapped value is an `E`.
    #[must_use]
    pub fn is<E: Any>(&self) -> bool {
        self.type_id == TypeId::of::<E>()
    }

    /// Borrows the wrapped value as an `E`.
    #[must_use]
    pub fn downcast_ref<E: Any>(&self) -> Option<&E> {
        self.value.downcast_ref::<E>()
    }
}

impl fmt::Debug for EventPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPayload")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_event_type_equality_ignores_alias() {
        let id = Uuid::new_v4();
        let plain = EventType::new(id);
        let aliased = EventType::new(id).with_alias("DishPrepared");

        assert_eq!(plain, aliased);
        assert!(!plain.matches_exactly(&aliased));

        let mut set = HashSet::new();
        set.insert(plain);
        assert!(set.contains(&aliased));
    }

    #[test]
    fn test_event_type_generation_is_part_of_identity() {
        let id = Uuid::new_v4();

        let first = EventType::new(id);
        let second = EventType::with_generation(id, 2).unwrap();

        assert_ne!(first, second);
        assert_eq!(second.generation().value(), 2);
    }

    #[test]
    fn test_generation_zero_is_rejected() {
        let result = EventType::with_generation(Uuid::new_v4(), 0);

        assert_eq!(result.unwrap_err(), EventTypeError::InvalidGeneration(0));
    }

    #[test]
    fn test_generation_deserialization_rejects_zero() {
        let result: Result<Generation, _> = serde_json::from_str("0");

        assert!(result.is_err());
    }

    #[test]
    fn test_event_type_display_includes_alias() {
        let id = Uuid::nil();
        let event_type = EventType::new(id).with_alias("DishPrepared");

        assert_eq!(
            event_type.to_string(),
            "DishPrepared (00000000-0000-0000-0000-000000000000/1)"
        );
    }

    #[test]
    fn test_payload_downcasts_to_the_wrapped_type_only() {
        let payload = EventPayload::new(42_u32);

        assert!(payload.is::<u32>());
        assert_eq!(payload.downcast_ref::<u32>(), Some(&42));
        assert!(payload.downcast_ref::<String>().is_none());
        assert_eq!(payload.type_name(), "u32");
    }
}
