//! The event store facade over an [`EventStoreRuntime`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tracing::{info, instrument, warn};
use tributary_core::cancellation::CancellationToken;
use tributary_core::error::{EventSequenceError, RuntimeError};
use tributary_core::event::{Event, EventPayload, EventType};
use tributary_core::execution::{ExecutionContext, TenantId};
use tributary_core::identity::{AggregateRootId, AggregateRootVersion, EventSourceId};
use tributary_core::registry::EventTypeRegistry;
use tributary_core::runtime::{
    CommitForAggregateRequest, CommitRequest, EventStoreRuntime, FetchForAggregateRequest,
};
use tributary_core::sequence::{
    CommittedAggregateEvents, CommittedEvents, UncommittedAggregateEvent,
    UncommittedAggregateEvents, UncommittedEvent, UncommittedEvents,
};

use crate::error::EventStoreError;

/// Commits and fetches events for one execution context.
#[derive(Clone)]
pub struct EventStore {
    runtime: Arc<dyn EventStoreRuntime>,
    registry: Arc<EventTypeRegistry>,
    execution_context: ExecutionContext,
}

impl EventStore {
    /// Creates an event store issuing requests in `execution_context`.
    #[must_use]
    pub fn new(
        runtime: Arc<dyn EventStoreRuntime>,
        registry: Arc<EventTypeRegistry>,
        execution_context: ExecutionContext,
    ) -> Self {
        Self {
            runtime,
            registry,
            execution_context,
        }
    }

    /// Returns an event store for the same Runtime scoped to `tenant_id`.
    #[must_use]
    pub fn for_tenant(&self, tenant_id: TenantId) -> Self {
        Self {
            runtime: Arc::clone(&self.runtime),
            registry: Arc::clone(&self.registry),
            execution_context: self.execution_context.for_tenant(tenant_id),
        }
    }

    /// The execution context threaded into requests.
    #[must_use]
    pub fn execution_context(&self) -> &ExecutionContext {
        &self.execution_context
    }

    /// The registry used to serialize typed events.
    #[must_use]
    pub fn registry(&self) -> &EventTypeRegistry {
        &self.registry
    }

    /// Converts a typed event into an uncommitted event.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::Registry` if `E` is not associated or does not
    /// serialize, and `EventStoreError::InvalidEvents` for an empty source.
    pub fn uncommitted<E: Event>(
        &self,
        event: E,
        event_source: impl Into<EventSourceId>,
        is_public: bool,
    ) -> Result<UncommittedEvent, EventStoreError> {
        let event_source = event_source.into();
        if event_source.is_empty() {
            return Err(EventStoreError::InvalidEvents(
                EventSequenceError::EventSourceCannotBeEmpty,
            ));
        }
        let (event_type, content) = self.registry.serialize(&EventPayload::new(event))?;
        Ok(UncommittedEvent {
            event_source,
            event_type,
            content,
            is_public,
        })
    }

    /// Commits `events` to the event log.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError` if the Runtime fails, its response is
    /// invalid, or `cancellation` fires first.
    #[instrument(
        skip(self, events, cancellation),
        fields(tenant_id = %self.execution_context.tenant_id, events = events.len())
    )]
    pub async fn commit(
        &self,
        events: UncommittedEvents,
        cancellation: &CancellationToken,
    ) -> Result<CommittedEvents, EventStoreError> {
        let request = CommitRequest {
            execution_context: self.execution_context.clone(),
            events,
        };
        let committed = with_cancellation(cancellation, self.runtime.commit(request))
            .await
            .inspect_err(|error| warn!(%error, "commit failed"))?;
        info!(committed = committed.len(), "committed events");
        Ok(committed)
    }

    /// Commits one private event.
    ///
    /// # Errors
    ///
    /// As [`uncommitted`](Self::uncommitted) and [`commit`](Self::commit).
    pub async fn commit_event<E: Event>(
        &self,
        event: E,
        event_source: impl Into<EventSourceId>,
        cancellation: &CancellationToken,
    ) -> Result<CommittedEvents, EventStoreError> {
        let event = self.uncommitted(event, event_source, false)?;
        let events =
            UncommittedEvents::from_events([event]).map_err(EventStoreError::InvalidEvents)?;
        self.commit(events, cancellation).await
    }

    /// Commits one public event, visible to other microservices.
    ///
    /// # Errors
    ///
    /// As [`uncommitted`](Self::uncommitted) and [`commit`](Self::commit).
    pub async fn commit_public<E: Event>(
        &self,
        event: E,
        event_source: impl Into<EventSourceId>,
        cancellation: &CancellationToken,
    ) -> Result<CommittedEvents, EventStoreError> {
        let event = self.uncommitted(event, event_source, true)?;
        let events =
            UncommittedEvents::from_events([event]).map_err(EventStoreError::InvalidEvents)?;
        self.commit(events, cancellation).await
    }

    /// Starts a commit of events applied by an aggregate root instance that
    /// is expected to be at `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::InvalidEvents` for an empty event source.
    pub fn aggregate(
        &self,
        aggregate_root_id: AggregateRootId,
        event_source: impl Into<EventSourceId>,
        expected_version: AggregateRootVersion,
    ) -> Result<AggregateCommit<'_>, EventStoreError> {
        let events = UncommittedAggregateEvents::new(
            event_source.into(),
            aggregate_root_id,
            expected_version,
        )
        .map_err(EventStoreError::InvalidEvents)?;
        Ok(AggregateCommit {
            store: self,
            events,
        })
    }

    /// Commits events applied by an aggregate root.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::ConcurrencyConflict` if the aggregate root is
    /// not at the expected version, `EventStoreError::InvalidResponse` if the
    /// Runtime answers for another aggregate instance, and otherwise as
    /// [`commit`](Self::commit).
    #[instrument(
        skip(self, events, cancellation),
        fields(
            aggregate_root_id = %events.aggregate_root_id(),
            event_source = %events.event_source(),
            expected_version = %events.expected_aggregate_root_version(),
        )
    )]
    pub async fn commit_for_aggregate(
        &self,
        events: UncommittedAggregateEvents,
        cancellation: &CancellationToken,
    ) -> Result<CommittedAggregateEvents, EventStoreError> {
        let aggregate_root_id = events.aggregate_root_id();
        let event_source = events.event_source().clone();
        let request = CommitForAggregateRequest {
            execution_context: self.execution_context.clone(),
            events,
        };
        let committed = with_cancellation(cancellation, self.runtime.commit_for_aggregate(request))
            .await
            .and_then(|committed| same_instance(committed, aggregate_root_id, &event_source))
            .inspect_err(|error| warn!(%error, "commit for aggregate failed"))?;
        info!(
            version = %committed.aggregate_root_version(),
            committed = committed.len(),
            "committed aggregate events"
        );
        Ok(committed)
    }

    /// Fetches all events applied by an aggregate root instance.
    ///
    /// # Errors
    ///
    /// As [`commit_for_aggregate`](Self::commit_for_aggregate), without the
    /// concurrency conflict.
    pub async fn fetch_for_aggregate(
        &self,
        aggregate_root_id: AggregateRootId,
        event_source: impl Into<EventSourceId>,
        cancellation: &CancellationToken,
    ) -> Result<CommittedAggregateEvents, EventStoreError> {
        self.fetch(aggregate_root_id, event_source.into(), None, cancellation)
            .await
    }

    /// Fetches the events of the given types applied by an aggregate root
    /// instance. The reported version is that of the whole stream.
    ///
    /// # Errors
    ///
    /// As [`fetch_for_aggregate`](Self::fetch_for_aggregate).
    pub async fn fetch_for_aggregate_by_event_types(
        &self,
        aggregate_root_id: AggregateRootId,
        event_source: impl Into<EventSourceId>,
        event_types: impl IntoIterator<Item = EventType>,
        cancellation: &CancellationToken,
    ) -> Result<CommittedAggregateEvents, EventStoreError> {
        self.fetch(
            aggregate_root_id,
            event_source.into(),
            Some(event_types.into_iter().collect()),
            cancellation,
        )
        .await
    }

    #[instrument(
        skip(self, aggregate_root_id, event_source, event_types, cancellation),
        fields(aggregate_root_id = %aggregate_root_id, event_source = %event_source)
    )]
    async fn fetch(
        &self,
        aggregate_root_id: AggregateRootId,
        event_source: EventSourceId,
        event_types: Option<Vec<EventType>>,
        cancellation: &CancellationToken,
    ) -> Result<CommittedAggregateEvents, EventStoreError> {
        let request = FetchForAggregateRequest {
            execution_context: self.execution_context.clone(),
            aggregate_root_id,
            event_source: event_source.clone(),
            event_types,
        };
        let fetched = with_cancellation(cancellation, self.runtime.fetch_for_aggregate(request))
            .await
            .and_then(|fetched| same_instance(fetched, aggregate_root_id, &event_source))
            .inspect_err(|error| warn!(%error, "fetch for aggregate failed"))?;
        info!(
            version = %fetched.aggregate_root_version(),
            fetched = fetched.len(),
            "fetched aggregate events"
        );
        Ok(fetched)
    }
}

impl fmt::Debug for EventStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStore")
            .field("execution_context", &self.execution_context)
            .finish_non_exhaustive()
    }
}

/// Events applied by one aggregate root instance, collected before commit.
#[derive(Debug)]
pub struct AggregateCommit<'a> {
    store: &'a EventStore,
    events: UncommittedAggregateEvents,
}

impl AggregateCommit<'_> {
    /// Adds a private event.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError` if the event cannot be serialized.
    pub fn apply<E: Event>(self, event: E) -> Result<Self, EventStoreError> {
        self.push(event, false)
    }

    /// Adds a public event.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError` if the event cannot be serialized.
    pub fn apply_public<E: Event>(self, event: E) -> Result<Self, EventStoreError> {
        self.push(event, true)
    }

    fn push<E: Event>(mut self, event: E, is_public: bool) -> Result<Self, EventStoreError> {
        let (event_type, content) = self.store.registry.serialize(&EventPayload::new(event))?;
        self.events
            .push(UncommittedAggregateEvent {
                event_type,
                content,
                is_public,
            })
            .map_err(EventStoreError::InvalidEvents)?;
        Ok(self)
    }

    /// The events collected so far.
    #[must_use]
    pub fn events(&self) -> &UncommittedAggregateEvents {
        &self.events
    }

    /// Commits the collected events.
    ///
    /// # Errors
    ///
    /// As [`EventStore::commit_for_aggregate`].
    pub async fn commit(
        self,
        cancellation: &CancellationToken,
    ) -> Result<CommittedAggregateEvents, EventStoreError> {
        self.store
            .commit_for_aggregate(self.events, cancellation)
            .await
    }
}

async fn with_cancellation<T>(
    cancellation: &CancellationToken,
    call: impl Future<Output = Result<T, RuntimeError>>,
) -> Result<T, EventStoreError> {
    if cancellation.is_cancelled() {
        return Err(EventStoreError::Cancelled);
    }
    tokio::select! {
        result = call => result.map_err(EventStoreError::from),
        () = cancellation.cancelled() => Err(EventStoreError::Cancelled),
    }
}

fn same_instance(
    events: CommittedAggregateEvents,
    aggregate_root_id: AggregateRootId,
    event_source: &EventSourceId,
) -> Result<CommittedAggregateEvents, EventStoreError> {
    if events.aggregate_root_id() != aggregate_root_id {
        return Err(EventStoreError::InvalidResponse(
            EventSequenceError::EventWasAppliedByOtherAggregateRoot {
                expected: aggregate_root_id,
                actual: events.aggregate_root_id(),
            },
        ));
    }
    if events.event_source() != event_source {
        return Err(EventStoreError::InvalidResponse(
            EventSequenceError::EventWasAppliedToOtherEventSource {
                expected: event_source.clone(),
                actual: events.event_source().clone(),
            },
        ));
    }
    Ok(events)
}
