//! Ordered, invariant-checked event sequences exchanged with the Runtime.

mod aggregate;
mod committed;
mod uncommitted;

pub use aggregate::{
    CommittedAggregateEvent, CommittedAggregateEvents, UncommittedAggregateEvent,
    UncommittedAggregateEvents,
};
pub use committed::{CommittedEvent, CommittedEvents};
pub use uncommitted::{UncommittedEvent, UncommittedEvents};

use serde_json::Value;

use crate::error::EventSequenceError;
use crate::event::EventType;

/// Rejects JSON `null` event content.
fn ensure_content(event_type: &EventType, content: &Value) -> Result<(), EventSequenceError> {
    if content.is_null() {
        return Err(EventSequenceError::EventCannotBeNull {
            event_type: event_type.clone(),
        });
    }
    Ok(())
}
