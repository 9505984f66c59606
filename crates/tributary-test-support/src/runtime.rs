//! Test runtimes: `EventStoreRuntime` implementations for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tributary_core::clock::Clock;
use tributary_core::error::RuntimeError;
use tributary_core::identity::{
    AggregateRootId, AggregateRootVersion, EventLogSequenceNumber, EventSourceId,
};
use tributary_core::runtime::{
    CommitForAggregateRequest, CommitRequest, EventStoreRuntime, FetchForAggregateRequest,
};
use tributary_core::sequence::{
    CommittedAggregateEvent, CommittedAggregateEvents, CommittedEvent, CommittedEvents,
};

use crate::clock::FixedClock;

#[derive(Debug, Default)]
struct EventLog {
    next_sequence_number: u64,
    committed: Vec<CommittedEvent>,
    aggregates: HashMap<(AggregateRootId, EventSourceId), Vec<CommittedAggregateEvent>>,
}

impl EventLog {
    fn take_sequence_number(&mut self) -> EventLogSequenceNumber {
        let sequence_number = EventLogSequenceNumber(self.next_sequence_number);
        self.next_sequence_number += 1;
        sequence_number
    }
}

/// An in-memory event log behaving like the Runtime's event store.
///
/// Assigns event log sequence numbers from 0, versions aggregate events
/// from the expected version, and reports concurrency conflicts when the
/// expected version does not match.
pub struct InMemoryRuntime {
    clock: Box<dyn Clock>,
    log: Mutex<EventLog>,
}

impl InMemoryRuntime {
    /// Creates an empty event log stamping events with a [`FixedClock`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(FixedClock::default())
    }

    /// Creates an empty event log stamping events with `clock`.
    #[must_use]
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            clock: Box::new(clock),
            log: Mutex::new(EventLog::default()),
        }
    }

    /// Returns every event committed outside aggregates, in log order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn committed_events(&self) -> Vec<CommittedEvent> {
        self.log.lock().unwrap().committed.clone()
    }
}

impl Default for InMemoryRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRuntime").finish_non_exhaustive()
    }
}

#[async_trait]
impl EventStoreRuntime for InMemoryRuntime {
    async fn commit(&self, request: CommitRequest) -> Result<CommittedEvents, RuntimeError> {
        let mut log = self.log.lock().unwrap();
        let occurred = self.clock.now();
        let mut committed = Vec::with_capacity(request.events.len());
        for event in request.events {
            committed.push(CommittedEvent {
                sequence_number: log.take_sequence_number(),
                occurred,
                event_source: event.event_source,
                execution_context: request.execution_context.clone(),
                event_type: event.event_type,
                content: event.content,
                is_public: event.is_public,
            });
        }
        log.committed.extend(committed.iter().cloned());
        Ok(CommittedEvents::new(committed)?)
    }

    async fn commit_for_aggregate(
        &self,
        request: CommitForAggregateRequest,
    ) -> Result<CommittedAggregateEvents, RuntimeError> {
        let mut log = self.log.lock().unwrap();
        let batch = request.events;
        let key = (batch.aggregate_root_id(), batch.event_source().clone());
        let current = log
            .aggregates
            .get(&key)
            .and_then(|events| events.last())
            .map_or(AggregateRootVersion::INITIAL, |event| {
                event.aggregate_root_version
            });
        if current != batch.expected_aggregate_root_version() {
            return Err(RuntimeError::ConcurrencyConflict {
                aggregate_root_id: batch.aggregate_root_id(),
                event_source: batch.event_source().clone(),
                expected: batch.expected_aggregate_root_version(),
                actual: current,
            });
        }

        let occurred = self.clock.now();
        let mut version = current;
        let mut committed = Vec::with_capacity(batch.len());
        for event in batch.iter() {
            version = version.next();
            committed.push(CommittedAggregateEvent {
                sequence_number: log.take_sequence_number(),
                occurred,
                event_source: batch.event_source().clone(),
                aggregate_root_id: batch.aggregate_root_id(),
                aggregate_root_version: version,
                execution_context: request.execution_context.clone(),
                event_type: event.event_type.clone(),
                content: event.content.clone(),
                is_public: event.is_public,
            });
        }
        log.aggregates
            .entry(key)
            .or_default()
            .extend(committed.iter().cloned());
        Ok(CommittedAggregateEvents::with_version(
            batch.event_source().clone(),
            batch.aggregate_root_id(),
            version,
            committed,
        )?)
    }

    async fn fetch_for_aggregate(
        &self,
        request: FetchForAggregateRequest,
    ) -> Result<CommittedAggregateEvents, RuntimeError> {
        let log = self.log.lock().unwrap();
        let stream = log
            .aggregates
            .get(&(request.aggregate_root_id, request.event_source.clone()))
            .cloned()
            .unwrap_or_default();
        let version = stream
            .last()
            .map_or(AggregateRootVersion::INITIAL, |event| {
                event.aggregate_root_version
            });
        let events = match request.event_types {
            None => stream,
            Some(event_types) => stream
                .into_iter()
                .filter(|event| event_types.contains(&event.event_type))
                .collect(),
        };
        Ok(CommittedAggregateEvents::with_version(
            request.event_source,
            request.aggregate_root_id,
            version,
            events,
        )?)
    }
}

/// A request observed by [`RecordingRuntime`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedRequest {
    /// A `commit` call.
    Commit(CommitRequest),
    /// A `commit_for_aggregate` call.
    CommitForAggregate(CommitForAggregateRequest),
    /// A `fetch_for_aggregate` call.
    FetchForAggregate(FetchForAggregateRequest),
}

/// A runtime that records every request and answers it from an
/// [`InMemoryRuntime`].
#[derive(Debug, Default)]
pub struct RecordingRuntime {
    inner: InMemoryRuntime,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl RecordingRuntime {
    /// Creates a recording runtime over an empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all requests received so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, request: RecordedRequest) {
        self.requests.lock().unwrap().push(request);
    }
}

#[async_trait]
impl EventStoreRuntime for RecordingRuntime {
    async fn commit(&self, request: CommitRequest) -> Result<CommittedEvents, RuntimeError> {
        self.record(RecordedRequest::Commit(request.clone()));
        self.inner.commit(request).await
    }

    async fn commit_for_aggregate(
        &self,
        request: CommitForAggregateRequest,
    ) -> Result<CommittedAggregateEvents, RuntimeError> {
        self.record(RecordedRequest::CommitForAggregate(request.clone()));
        self.inner.commit_for_aggregate(request).await
    }

    async fn fetch_for_aggregate(
        &self,
        request: FetchForAggregateRequest,
    ) -> Result<CommittedAggregateEvents, RuntimeError> {
        self.record(RecordedRequest::FetchForAggregate(request.clone()));
        self.inner.fetch_for_aggregate(request).await
    }
}

/// A runtime that answers aggregate requests on behalf of another aggregate
/// root instance. Useful for testing response validation.
///
/// Requests are applied to an [`InMemoryRuntime`]; the returned events are
/// then relabelled with the configured aggregate root id or event source.
#[derive(Debug, Default)]
pub struct MisdirectedRuntime {
    inner: InMemoryRuntime,
    aggregate_root_id: Option<AggregateRootId>,
    event_source: Option<EventSourceId>,
}

impl MisdirectedRuntime {
    /// Answers every aggregate request as if `aggregate_root_id` applied the
    /// events.
    #[must_use]
    pub fn answering_for_aggregate_root(aggregate_root_id: AggregateRootId) -> Self {
        Self {
            aggregate_root_id: Some(aggregate_root_id),
            ..Self::default()
        }
    }

    /// Answers every aggregate request as if the events were applied to
    /// `event_source`.
    #[must_use]
    pub fn answering_for_event_source(event_source: impl Into<EventSourceId>) -> Self {
        Self {
            event_source: Some(event_source.into()),
            ..Self::default()
        }
    }

    fn relabel(
        &self,
        events: &CommittedAggregateEvents,
    ) -> Result<CommittedAggregateEvents, RuntimeError> {
        let aggregate_root_id = self
            .aggregate_root_id
            .unwrap_or_else(|| events.aggregate_root_id());
        let event_source = self
            .event_source
            .clone()
            .unwrap_or_else(|| events.event_source().clone());
        let relabelled = events
            .iter()
            .cloned()
            .map(|mut event| {
                event.aggregate_root_id = aggregate_root_id;
                event.event_source = event_source.clone();
                event
            })
            .collect();
        Ok(CommittedAggregateEvents::with_version(
            event_source,
            aggregate_root_id,
            events.aggregate_root_version(),
            relabelled,
        )?)
    }
}

#[async_trait]
impl EventStoreRuntime for MisdirectedRuntime {
    async fn commit(&self, request: CommitRequest) -> Result<CommittedEvents, RuntimeError> {
        self.inner.commit(request).await
    }

    async fn commit_for_aggregate(
        &self,
        request: CommitForAggregateRequest,
    ) -> Result<CommittedAggregateEvents, RuntimeError> {
        let committed = self.inner.commit_for_aggregate(request).await?;
        self.relabel(&committed)
    }

    async fn fetch_for_aggregate(
        &self,
        request: FetchForAggregateRequest,
    ) -> Result<CommittedAggregateEvents, RuntimeError> {
        let fetched = self.inner.fetch_for_aggregate(request).await?;
        self.relabel(&fetched)
    }
}

/// A runtime that is always unreachable. Useful for testing error-handling
/// paths.
#[derive(Debug)]
pub struct FailingRuntime;

#[async_trait]
impl EventStoreRuntime for FailingRuntime {
    async fn commit(&self, _request: CommitRequest) -> Result<CommittedEvents, RuntimeError> {
        Err(RuntimeError::Unavailable("connection refused".into()))
    }

    async fn commit_for_aggregate(
        &self,
        _request: CommitForAggregateRequest,
    ) -> Result<CommittedAggregateEvents, RuntimeError> {
        Err(RuntimeError::Unavailable("connection refused".into()))
    }

    async fn fetch_for_aggregate(
        &self,
        _request: FetchForAggregateRequest,
    ) -> Result<CommittedAggregateEvents, RuntimeError> {
        Err(RuntimeError::Unavailable("connection refused".into()))
    }
}

/// A runtime whose calls never complete. Useful for testing cancellation.
#[derive(Debug)]
pub struct StalledRuntime;

#[async_trait]
impl EventStoreRuntime for StalledRuntime {
    async fn commit(&self, _request: CommitRequest) -> Result<CommittedEvents, RuntimeError> {
        std::future::pending().await
    }

    async fn commit_for_aggregate(
        &self,
        _request: CommitForAggregateRequest,
    ) -> Result<CommittedAggregateEvents, RuntimeError> {
        std::future::pending().await
    }

    async fn fetch_for_aggregate(
        &self,
        _request: FetchForAggregateRequest,
    ) -> Result<CommittedAggregateEvents, RuntimeError> {
        std::future::pending().await
    }
}
