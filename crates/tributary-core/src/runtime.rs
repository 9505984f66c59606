//! The logical request/response contract with the Runtime.
//!
//! Wire stubs (gRPC) implement [`EventStoreRuntime`] outside the SDK core.

use async_trait::async_trait;

use crate::error::RuntimeError;
use crate::event::EventType;
use crate::execution::ExecutionContext;
use crate::identity::{AggregateRootId, EventSourceId};
use crate::sequence::{
    CommittedAggregateEvents, CommittedEvents, UncommittedAggregateEvents, UncommittedEvents,
};

/// Request to commit events that do not belong to an aggregate root.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitRequest {
    /// Context the events are committed in.
    pub execution_context: ExecutionContext,
    /// The events, in commit order.
    pub events: UncommittedEvents,
}

/// Request to commit events applied by an aggregate root.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitForAggregateRequest {
    /// Context the events are committed in.
    pub execution_context: ExecutionContext,
    /// The events, with the expected aggregate root version.
    pub events: UncommittedAggregateEvents,
}

/// Request to fetch the events of an aggregate root instance.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchForAggregateRequest {
    /// Context the events are fetched in.
    pub execution_context: ExecutionContext,
    /// The aggregate root that applied the events.
    pub aggregate_root_id: AggregateRootId,
    /// The event source the events were applied to.
    pub event_source: EventSourceId,
    /// Only return events of these types; `None` returns all events.
    pub event_types: Option<Vec<EventType>>,
}

/// Transport-agnostic access to the Runtime's event store.
///
/// Implementations never retry; failures are returned to the caller.
#[async_trait]
pub trait EventStoreRuntime: Send + Sync {
    /// Commits events to the event log.
    async fn commit(&self, request: CommitRequest) -> Result<CommittedEvents, RuntimeError>;

    /// Commits aggregate events if the aggregate root is at the expected version.
    async fn commit_for_aggregate(
        &self,
        request: CommitForAggregateRequest,
    ) -> Result<CommittedAggregateEvents, RuntimeError>;

    /// Fetches the committed events of an aggregate root instance.
    async fn fetch_for_aggregate(
        &self,
        request: FetchForAggregateRequest,
    ) -> Result<CommittedAggregateEvents, RuntimeError>;
}
