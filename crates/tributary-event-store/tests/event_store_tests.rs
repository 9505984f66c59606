//! Integration tests for `EventStore` against the test runtimes.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tributary_core::cancellation::CancellationToken;
use tributary_core::error::EventSequenceError;
use tributary_core::event::{Event, EventType};
use tributary_core::execution::{ExecutionContext, TenantId};
use tributary_core::identity::{AggregateRootId, AggregateRootVersion, EventSourceId};
use tributary_core::registry::EventTypeRegistry;
use tributary_core::runtime::EventStoreRuntime;
use tributary_event_store::error::EventStoreError;
use tributary_event_store::event_store::EventStore;
use tributary_test_support::{
    FailingRuntime, InMemoryRuntime, MisdirectedRuntime, RecordedRequest, RecordingRuntime,
    StalledRuntime,
};
use uuid::Uuid;

const BOOK_BORROWED: Uuid = Uuid::from_u128(0x5a1c_0001);
const BOOK_RETURNED: Uuid = Uuid::from_u128(0x5a1c_0002);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BookBorrowed {
    member: String,
}

impl Event for BookBorrowed {}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BookReturned {
    member: String,
}

impl Event for BookReturned {}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ShelfMoved;

impl Event for ShelfMoved {}

fn registry() -> Arc<EventTypeRegistry> {
    let mut registry = EventTypeRegistry::new();
    registry
        .associate::<BookBorrowed>(EventType::new(BOOK_BORROWED))
        .unwrap();
    registry
        .associate::<BookReturned>(EventType::new(BOOK_RETURNED))
        .unwrap();
    Arc::new(registry)
}

fn store_over(runtime: Arc<dyn EventStoreRuntime>) -> EventStore {
    EventStore::new(runtime, registry(), ExecutionContext::default())
}

fn library_book() -> AggregateRootId {
    AggregateRootId(Uuid::from_u128(0xb00c))
}

// --- commit ---

#[tokio::test]
async fn test_commit_event_assigns_sequence_numbers_from_zero() {
    let store = store_over(Arc::new(InMemoryRuntime::new()));
    let cancellation = CancellationToken::new();

    let first = store
        .commit_event(BookBorrowed { member: "ada".into() }, "book-1", &cancellation)
        .await
        .unwrap();
    let second = store
        .commit_public(BookReturned { member: "ada".into() }, "book-1", &cancellation)
        .await
        .unwrap();

    assert_eq!(first.as_slice()[0].sequence_number.value(), 0);
    assert!(!first.as_slice()[0].is_public);
    assert_eq!(second.as_slice()[0].sequence_number.value(), 1);
    assert!(second.as_slice()[0].is_public);
    assert_eq!(second.as_slice()[0].event_type, EventType::new(BOOK_RETURNED));
    assert_eq!(
        second.as_slice()[0].content,
        serde_json::json!({"member": "ada"})
    );
}

#[tokio::test]
async fn test_commit_event_with_unassociated_type_returns_registry_error() {
    let store = store_over(Arc::new(InMemoryRuntime::new()));

    let result = store
        .commit_event(ShelfMoved, "shelf-1", &CancellationToken::new())
        .await;

    match result {
        Err(EventStoreError::Registry(_)) => {}
        other => panic!("expected Registry error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_commit_event_with_empty_event_source_is_rejected() {
    let store = store_over(Arc::new(InMemoryRuntime::new()));

    let result = store
        .commit_event(BookBorrowed { member: "ada".into() }, "", &CancellationToken::new())
        .await;

    match result {
        Err(EventStoreError::InvalidEvents(_)) => {}
        other => panic!("expected InvalidEvents, got {other:?}"),
    }
}

// --- commit for aggregate ---

#[tokio::test]
async fn test_commit_for_aggregate_versions_events_after_expected_version() {
    // Arrange
    let store = store_over(Arc::new(InMemoryRuntime::new()));
    let cancellation = CancellationToken::new();

    // Act
    let committed = store
        .aggregate(library_book(), "book-1", AggregateRootVersion::INITIAL)
        .unwrap()
        .apply(BookBorrowed { member: "ada".into() })
        .unwrap()
        .apply(BookReturned { member: "ada".into() })
        .unwrap()
        .apply_public(BookBorrowed { member: "grace".into() })
        .unwrap()
        .commit(&cancellation)
        .await
        .unwrap();

    // Assert
    assert_eq!(committed.len(), 3);
    assert_eq!(committed.aggregate_root_version(), AggregateRootVersion(3));
    assert_eq!(committed.aggregate_root_id(), library_book());
    let versions: Vec<u64> = committed
        .iter()
        .map(|event| event.aggregate_root_version.value())
        .collect();
    assert_eq!(versions, vec![1, 2, 3]);
    let sequence_numbers: Vec<u64> = committed
        .iter()
        .map(|event| event.sequence_number.value())
        .collect();
    assert!(sequence_numbers.windows(2).all(|pair| pair[0] < pair[1]));
    assert!(committed.as_slice()[2].is_public);
}

#[tokio::test]
async fn test_commit_for_aggregate_with_stale_version_returns_concurrency_conflict() {
    let store = store_over(Arc::new(InMemoryRuntime::new()));
    let cancellation = CancellationToken::new();
    store
        .aggregate(library_book(), "book-1", AggregateRootVersion::INITIAL)
        .unwrap()
        .apply(BookBorrowed { member: "ada".into() })
        .unwrap()
        .commit(&cancellation)
        .await
        .unwrap();

    let result = store
        .aggregate(library_book(), "book-1", AggregateRootVersion::INITIAL)
        .unwrap()
        .apply(BookBorrowed { member: "grace".into() })
        .unwrap()
        .commit(&cancellation)
        .await;

    match result {
        Err(EventStoreError::ConcurrencyConflict {
            expected, actual, ..
        }) => {
            assert_eq!(expected, AggregateRootVersion(0));
            assert_eq!(actual, AggregateRootVersion(1));
        }
        other => panic!("expected ConcurrencyConflict, got {other:?}"),
    }
}

#[test]
fn test_aggregate_with_empty_event_source_is_rejected() {
    let store = store_over(Arc::new(InMemoryRuntime::new()));

    let result = store.aggregate(library_book(), "", AggregateRootVersion::INITIAL);

    assert!(matches!(result, Err(EventStoreError::InvalidEvents(_))));
}

// --- fetch for aggregate ---

#[tokio::test]
async fn test_fetch_for_aggregate_returns_all_events_and_version() {
    let store = store_over(Arc::new(InMemoryRuntime::new()));
    let cancellation = CancellationToken::new();
    store
        .aggregate(library_book(), "book-1", AggregateRootVersion::INITIAL)
        .unwrap()
        .apply(BookBorrowed { member: "ada".into() })
        .unwrap()
        .apply(BookReturned { member: "ada".into() })
        .unwrap()
        .commit(&cancellation)
        .await
        .unwrap();

    let fetched = store
        .fetch_for_aggregate(library_book(), "book-1", &cancellation)
        .await
        .unwrap();

    assert_eq!(fetched.len(), 2);
    assert_eq!(fetched.aggregate_root_version(), AggregateRootVersion(2));
    assert_eq!(fetched.event_source(), &EventSourceId::new("book-1"));
}

#[tokio::test]
async fn test_fetch_for_aggregate_by_event_types_keeps_stream_version() {
    let store = store_over(Arc::new(InMemoryRuntime::new()));
    let cancellation = CancellationToken::new();
    store
        .aggregate(library_book(), "book-1", AggregateRootVersion::INITIAL)
        .unwrap()
        .apply(BookBorrowed { member: "ada".into() })
        .unwrap()
        .apply(BookReturned { member: "ada".into() })
        .unwrap()
        .apply(BookBorrowed { member: "grace".into() })
        .unwrap()
        .commit(&cancellation)
        .await
        .unwrap();

    let fetched = store
        .fetch_for_aggregate_by_event_types(
            library_book(),
            "book-1",
            [EventType::new(BOOK_RETURNED)],
            &cancellation,
        )
        .await
        .unwrap();

    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched.as_slice()[0].aggregate_root_version, AggregateRootVersion(2));
    assert_eq!(fetched.aggregate_root_version(), AggregateRootVersion(3));
}

#[tokio::test]
async fn test_fetch_for_unknown_aggregate_is_empty_at_initial_version() {
    let store = store_over(Arc::new(InMemoryRuntime::new()));

    let fetched = store
        .fetch_for_aggregate(library_book(), "book-404", &CancellationToken::new())
        .await
        .unwrap();

    assert!(fetched.is_empty());
    assert_eq!(fetched.aggregate_root_version(), AggregateRootVersion::INITIAL);
}

// --- runtime responses ---

#[tokio::test]
async fn test_commit_answered_for_other_aggregate_root_is_invalid_response() {
    // Arrange
    let other_book = AggregateRootId(Uuid::from_u128(0xb00d));
    let store = store_over(Arc::new(MisdirectedRuntime::answering_for_aggregate_root(
        other_book,
    )));

    // Act
    let result = store
        .aggregate(library_book(), "book-1", AggregateRootVersion::INITIAL)
        .unwrap()
        .apply(BookBorrowed { member: "ada".into() })
        .unwrap()
        .commit(&CancellationToken::new())
        .await;

    // Assert
    match result {
        Err(EventStoreError::InvalidResponse(
            EventSequenceError::EventWasAppliedByOtherAggregateRoot { expected, actual },
        )) => {
            assert_eq!(expected, library_book());
            assert_eq!(actual, other_book);
        }
        other => panic!("expected InvalidResponse, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_answered_for_other_aggregate_root_is_invalid_response() {
    let other_book = AggregateRootId(Uuid::from_u128(0xb00d));
    let store = store_over(Arc::new(MisdirectedRuntime::answering_for_aggregate_root(
        other_book,
    )));

    let result = store
        .fetch_for_aggregate(library_book(), "book-1", &CancellationToken::new())
        .await;

    match result {
        Err(EventStoreError::InvalidResponse(
            EventSequenceError::EventWasAppliedByOtherAggregateRoot { expected, actual },
        )) => {
            assert_eq!(expected, library_book());
            assert_eq!(actual, other_book);
        }
        other => panic!("expected InvalidResponse, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_answered_for_other_event_source_is_invalid_response() {
    let store = store_over(Arc::new(MisdirectedRuntime::answering_for_event_source(
        "book-2",
    )));
    let cancellation = CancellationToken::new();
    let committed = store
        .aggregate(library_book(), "book-1", AggregateRootVersion::INITIAL)
        .unwrap()
        .apply(BookBorrowed { member: "ada".into() })
        .unwrap()
        .commit(&cancellation)
        .await;

    let fetched = store
        .fetch_for_aggregate(library_book(), "book-1", &cancellation)
        .await;

    for result in [committed, fetched] {
        match result {
            Err(EventStoreError::InvalidResponse(
                EventSequenceError::EventWasAppliedToOtherEventSource { expected, actual },
            )) => {
                assert_eq!(expected, EventSourceId::new("book-1"));
                assert_eq!(actual, EventSourceId::new("book-2"));
            }
            other => panic!("expected InvalidResponse, got {other:?}"),
        }
    }
}

// --- runtime failures and cancellation ---

#[tokio::test]
async fn test_unreachable_runtime_returns_unavailable() {
    let store = store_over(Arc::new(FailingRuntime));

    let result = store
        .fetch_for_aggregate(library_book(), "book-1", &CancellationToken::new())
        .await;

    match result {
        Err(EventStoreError::Unavailable(message)) => {
            assert_eq!(message, "connection refused");
        }
        other => panic!("expected Unavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn test_cancelling_a_stalled_commit_returns_cancelled() {
    let store = store_over(Arc::new(StalledRuntime));
    let cancellation = CancellationToken::new();
    let canceller = cancellation.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        canceller.cancel();
    });

    let result = store
        .commit_event(BookBorrowed { member: "ada".into() }, "book-1", &cancellation)
        .await;

    assert!(matches!(result, Err(EventStoreError::Cancelled)));
}

#[tokio::test]
async fn test_already_cancelled_token_skips_the_runtime() {
    let runtime = Arc::new(RecordingRuntime::new());
    let store = store_over(runtime.clone());
    let cancellation = CancellationToken::new();
    cancellation.cancel();

    let result = store
        .fetch_for_aggregate(library_book(), "book-1", &cancellation)
        .await;

    assert!(matches!(result, Err(EventStoreError::Cancelled)));
    assert!(runtime.requests().is_empty());
}

// --- execution context ---

#[tokio::test]
async fn test_for_tenant_threads_tenant_into_requests() {
    let runtime = Arc::new(RecordingRuntime::new());
    let store = store_over(runtime.clone());
    let tenant = TenantId(Uuid::from_u128(0x7e7a));

    store
        .for_tenant(tenant)
        .commit_event(BookBorrowed { member: "ada".into() }, "book-1", &CancellationToken::new())
        .await
        .unwrap();

    match runtime.requests().as_slice() {
        [RecordedRequest::Commit(request)] => {
            assert_eq!(request.execution_context.tenant_id, tenant);
            assert_eq!(request.events.len(), 1);
        }
        other => panic!("expected one commit request, got {other:?}"),
    }
    assert_eq!(store.execution_context().tenant_id, TenantId::default());
}
