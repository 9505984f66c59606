//! Contexts handed to read model handlers.

use chrono::{DateTime, Utc};
use tributary_core::cancellation::CancellationToken;
use tributary_core::execution::ExecutionContext;
use tributary_core::identity::{EventLogSequenceNumber, EventSourceId, PartitionId};

use super::ids::{EmbeddingKey, ProjectionKey};

/// Where and when the event being handled was committed.
#[derive(Debug, Clone, PartialEq)]
pub struct EventContext {
    /// Position of the event in the event log.
    pub sequence_number: EventLogSequenceNumber,
    /// The event source the event was recorded against.
    pub event_source: EventSourceId,
    /// The partition the event was written to.
    pub partition: PartitionId,
    /// When the event was committed.
    pub occurred: DateTime<Utc>,
    /// The execution context the event was committed in.
    pub execution_context: ExecutionContext,
}

/// Context of one projection `On` invocation.
#[derive(Debug, Clone)]
pub struct ProjectionContext {
    /// Key of the read model instance being updated.
    pub key: ProjectionKey,
    /// `true` if no state existed and the handler received the default state.
    pub was_created_from_initial_state: bool,
    /// The event's commit context.
    pub event: EventContext,
    /// Cancellation of the dispatch this invocation belongs to.
    pub cancellation: CancellationToken,
}

/// Context of one embedding reconciliation invocation.
#[derive(Debug, Clone)]
pub struct EmbeddingContext {
    /// Key of the embedding read model instance.
    pub key: EmbeddingKey,
    /// `true` if no state existed and the handler received the default state.
    pub was_created_from_initial_state: bool,
    /// The execution context of the reconciliation request.
    pub execution_context: ExecutionContext,
    /// Cancellation of the reconciliation request.
    pub cancellation: CancellationToken,
}

impl EmbeddingContext {
    /// Creates a context for reconciling the instance at `key`.
    #[must_use]
    pub fn new(key: EmbeddingKey, execution_context: ExecutionContext) -> Self {
        Self {
            key,
            was_created_from_initial_state: false,
            execution_context,
            cancellation: CancellationToken::new(),
        }
    }

    /// Returns this context observing `cancellation`.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }
}
