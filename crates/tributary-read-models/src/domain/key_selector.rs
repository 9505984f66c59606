//! Derivation of projection read model keys from events.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tributary_core::event::EventPayload;

use super::context::EventContext;
use super::ids::ProjectionKey;
use super::method::panic_message;
use super::projected_event::ProjectedEvent;

type KeyFn = dyn Fn(&EventPayload, &EventContext) -> Option<ProjectionKey> + Send + Sync;

/// Errors raised while deriving a projection key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeySelectionError {
    /// The event content has no such property.
    #[error("event content has no property '{property}'")]
    MissingProperty {
        /// The property name.
        property: String,
    },

    /// The property exists but is not a string, number or boolean.
    #[error("property '{property}' is not a scalar value")]
    NonScalarProperty {
        /// The property name.
        property: String,
    },

    /// A key function produced no key for the event.
    #[error("key function '{function}' returned no key")]
    NoKeyReturned {
        /// Name of the key function.
        function: String,
    },

    /// A key function panicked.
    #[error("key function '{function}' panicked: {message}")]
    FunctionPanicked {
        /// Name of the key function.
        function: String,
        /// The panic message.
        message: String,
    },

    /// The derived key is the empty string.
    #[error("derived key is empty")]
    EmptyKey,
}

/// A named key derivation function.
#[derive(Clone)]
pub struct KeyFunction {
    name: String,
    select: Arc<KeyFn>,
}

impl KeyFunction {
    /// Returns the name the function was declared with.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn select(&self, event: &ProjectedEvent) -> Result<ProjectionKey, KeySelectionError> {
        let selected = catch_unwind(AssertUnwindSafe(|| {
            (self.select)(&event.payload, &event.context)
        }))
        .map_err(|payload| KeySelectionError::FunctionPanicked {
            function: self.name.clone(),
            message: panic_message(payload),
        })?;
        selected.ok_or_else(|| KeySelectionError::NoKeyReturned {
            function: self.name.clone(),
        })
    }
}

impl fmt::Debug for KeyFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyFunction")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// How a projection derives the key of the read model an event updates.
#[derive(Debug, Clone)]
pub enum KeySelector {
    /// The event source id of the event.
    EventSourceId,
    /// The partition the event was written to.
    PartitionId,
    /// A top-level scalar property of the event content.
    Property(String),
    /// A custom function over the event and its context.
    Function(KeyFunction),
}

impl KeySelector {
    /// Selects the key from the property `name` of the event content.
    #[must_use]
    pub fn property(name: impl Into<String>) -> Self {
        Self::Property(name.into())
    }

    /// Selects the key with a named function.
    #[must_use]
    pub fn function<F>(name: impl Into<String>, select: F) -> Self
    where
        F: Fn(&EventPayload, &EventContext) -> Option<ProjectionKey> + Send + Sync + 'static,
    {
        Self::Function(KeyFunction {
            name: name.into(),
            select: Arc::new(select),
        })
    }

    /// Derives the read model key for `event`.
    ///
    /// # Errors
    ///
    /// Returns `KeySelectionError` if the key cannot be derived or is empty.
    pub fn key_for(&self, event: &ProjectedEvent) -> Result<ProjectionKey, KeySelectionError> {
        let key = match self {
            Self::EventSourceId => ProjectionKey::new(event.context.event_source.as_str()),
            Self::PartitionId => ProjectionKey::new(event.context.partition.as_str()),
            Self::Property(property) => property_key(&event.content, property)?,
            Self::Function(function) => function.select(event)?,
        };
        if key.as_str().is_empty() {
            return Err(KeySelectionError::EmptyKey);
        }
        Ok(key)
    }
}

impl fmt::Display for KeySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EventSourceId => f.write_str("event source id"),
            Self::PartitionId => f.write_str("partition id"),
            Self::Property(property) => write!(f, "property '{property}'"),
            Self::Function(function) => write!(f, "function '{}'", function.name),
        }
    }
}

fn property_key(content: &Value, property: &str) -> Result<ProjectionKey, KeySelectionError> {
    match content.get(property) {
        None => Err(KeySelectionError::MissingProperty {
            property: property.to_owned(),
        }),
        Some(Value::String(value)) => Ok(ProjectionKey::new(value.as_str())),
        Some(value @ (Value::Number(_) | Value::Bool(_))) => {
            Ok(ProjectionKey::new(value.to_string()))
        }
        Some(_) => Err(KeySelectionError::NonScalarProperty {
            property: property.to_owned(),
        }),
    }
}
