//! Embeddings: read models reconciled against externally received state.
//!
//! The Runtime drives the convergence loop; an embedding turns the
//! difference between the current and the received state into events.

use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument};
use tributary_core::cancellation::CancellationToken;
use tributary_core::error::{EventSequenceError, RegistryError};
use tributary_core::event::EventType;
use tributary_core::identity::EventSourceId;
use tributary_core::registry::EventTypeRegistry;
use tributary_core::sequence::{UncommittedEvent, UncommittedEvents};

use super::diagnostics::{Diagnostic, ResolutionFailed};
use super::dispatch::{apply_event, invoke};
use super::resolver::{EventHandler, ReadModelKind, ReconcileMethod, no_key_selector, resolve};
use crate::domain::context::EmbeddingContext;
use crate::domain::ids::{EmbeddingId, EmbeddingKey, ProjectionKey};
use crate::domain::method::{ContextFn, HandlerFuture, ReceivedStateFn, Returned, Role};
use crate::domain::projected_event::ProjectedEvent;
use crate::domain::read_model::ReadModel;
use crate::domain::verdict::{DispatchError, Dispatched};

/// Errors raised while reconciling an embedding.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The handler failed, panicked or was cancelled.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The embedding declares no method for the role.
    #[error("embedding declares no {role} method")]
    MethodNotDeclared {
        /// The role.
        role: Role,
    },

    /// The method returned an empty event list.
    #[error("{role} method '{method}' returned no events")]
    NoEventsReturned {
        /// The role.
        role: Role,
        /// The method name.
        method: String,
    },

    /// A returned event could not be serialized.
    #[error("returned event cannot be committed: {0}")]
    Registry(#[from] RegistryError),

    /// The returned events do not form a valid batch.
    #[error("returned events are invalid: {0}")]
    InvalidEvents(#[from] EventSequenceError),
}

/// Builds an [`Embedding`] of read model `R`.
pub struct EmbeddingBuilder<R> {
    id: EmbeddingId,
    alias: Option<String>,
    read_model: PhantomData<fn() -> R>,
}

impl<R: ReadModel> EmbeddingBuilder<R> {
    /// Starts an embedding.
    #[must_use]
    pub fn new(id: EmbeddingId) -> Self {
        Self {
            id,
            alias: None,
            read_model: PhantomData,
        }
    }

    /// Names the embedding for humans.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Resolves the handlers of `R` against `registry`.
    ///
    /// The registry is kept to serialize the events reconciliation returns.
    ///
    /// # Errors
    ///
    /// Returns `ResolutionFailed` with every problem found in the declarations.
    pub fn build(self, registry: Arc<EventTypeRegistry>) -> Result<Embedding<R>, ResolutionFailed> {
        let resolved = resolve::<R, ()>(ReadModelKind::Embedding, &registry, no_key_selector)?;
        let Some(update) = resolved.update else {
            return Err(ResolutionFailed::new(
                type_name::<R>(),
                vec![Diagnostic::MissingMethod { role: Role::Update }],
            ));
        };
        debug!(
            embedding = %self.id,
            read_model = type_name::<R>(),
            handlers = resolved.handlers.len(),
            "embedding resolved"
        );
        Ok(Embedding {
            id: self.id,
            alias: self.alias,
            registry,
            handlers: resolved.handlers,
            compare: resolved.compare,
            update,
            delete: resolved.delete,
            remove: resolved.remove,
        })
    }
}

/// An embedding with its `On` handlers and reconciliation methods.
pub struct Embedding<R> {
    id: EmbeddingId,
    alias: Option<String>,
    registry: Arc<EventTypeRegistry>,
    handlers: HashMap<EventType, EventHandler<R, ()>>,
    compare: Option<ReconcileMethod<ReceivedStateFn<R>>>,
    update: ReconcileMethod<ReceivedStateFn<R>>,
    delete: Option<ReconcileMethod<ContextFn<R>>>,
    remove: Option<ReconcileMethod<ContextFn<R>>>,
}

impl<R: ReadModel> Embedding<R> {
    /// The embedding id.
    #[must_use]
    pub fn id(&self) -> EmbeddingId {
        self.id
    }

    /// The alias, if any.
    #[must_use]
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// The event types the embedding's `On` methods handle.
    pub fn event_types(&self) -> impl Iterator<Item = &EventType> {
        self.handlers.keys()
    }

    /// Returns `true` if a method is declared for `role`.
    #[must_use]
    pub fn declares(&self, role: Role) -> bool {
        match role {
            Role::On => !self.handlers.is_empty(),
            Role::Update => true,
            Role::Compare => self.compare.is_some(),
            Role::Delete => self.delete.is_some(),
            Role::Remove => self.remove.is_some(),
        }
    }

    /// Applies an event committed by this embedding to the instance at `key`.
    #[instrument(
        skip_all,
        fields(embedding = %self.id, key = %key, event_type = %event.event_type)
    )]
    pub async fn on(
        &self,
        state: Option<R>,
        event: &ProjectedEvent,
        key: EmbeddingKey,
        cancellation: &CancellationToken,
    ) -> Dispatched<R> {
        let key = ProjectionKey::new(key.as_str());
        let Some(handler) = self.handlers.get(&event.event_type) else {
            return Dispatched::failed(
                Some(key),
                DispatchError::NoHandlerForEventType(event.event_type.clone()),
            );
        };
        let verdict = apply_event(&handler.handle, state, event, key.clone(), cancellation).await;
        Dispatched {
            key: Some(key),
            verdict,
        }
    }

    /// Produces the events that turn `current` into `received`.
    ///
    /// # Errors
    ///
    /// Returns `EmbeddingError` if the handler fails, returns no events, or
    /// returns events that cannot be committed.
    #[instrument(skip_all, fields(embedding = %self.id, key = %context.key))]
    pub async fn update(
        &self,
        current: R,
        received: R,
        context: EmbeddingContext,
    ) -> Result<UncommittedEvents, EmbeddingError> {
        let future = (self.update.handle)(current, received, context.clone());
        self.reconcile(Role::Update, &self.update.method, future, &context)
            .await
    }

    /// Produces the events that bring `current` closer to `received`, one
    /// step of the Runtime's convergence loop.
    ///
    /// # Errors
    ///
    /// Returns `EmbeddingError::MethodNotDeclared` without a `Compare` method,
    /// and otherwise as [`update`](Self::update).
    #[instrument(skip_all, fields(embedding = %self.id, key = %context.key))]
    pub async fn compare(
        &self,
        current: R,
        received: R,
        context: EmbeddingContext,
    ) -> Result<UncommittedEvents, EmbeddingError> {
        let method = self.compare.as_ref().ok_or(EmbeddingError::MethodNotDeclared {
            role: Role::Compare,
        })?;
        let future = (method.handle)(current, received, context.clone());
        self.reconcile(Role::Compare, &method.method, future, &context)
            .await
    }

    /// Produces the events that delete the instance.
    ///
    /// # Errors
    ///
    /// Returns `EmbeddingError::MethodNotDeclared` without a `Delete` method,
    /// and otherwise as [`update`](Self::update).
    #[instrument(skip_all, fields(embedding = %self.id, key = %context.key))]
    pub async fn delete(
        &self,
        current: R,
        context: EmbeddingContext,
    ) -> Result<UncommittedEvents, EmbeddingError> {
        let method = self.delete.as_ref().ok_or(EmbeddingError::MethodNotDeclared {
            role: Role::Delete,
        })?;
        let future = (method.handle)(current, context.clone());
        self.reconcile(Role::Delete, &method.method, future, &context)
            .await
    }

    /// Produces the events that remove the instance.
    ///
    /// # Errors
    ///
    /// Returns `EmbeddingError::MethodNotDeclared` without a `Remove` method,
    /// and otherwise as [`update`](Self::update).
    #[instrument(skip_all, fields(embedding = %self.id, key = %context.key))]
    pub async fn remove(
        &self,
        current: R,
        context: EmbeddingContext,
    ) -> Result<UncommittedEvents, EmbeddingError> {
        let method = self.remove.as_ref().ok_or(EmbeddingError::MethodNotDeclared {
            role: Role::Remove,
        })?;
        let future = (method.handle)(current, context.clone());
        self.reconcile(Role::Remove, &method.method, future, &context)
            .await
    }

    async fn reconcile(
        &self,
        role: Role,
        method: &str,
        future: HandlerFuture<Returned>,
        context: &EmbeddingContext,
    ) -> Result<UncommittedEvents, EmbeddingError> {
        let payloads = match invoke(future, &context.cancellation).await? {
            Returned::Event(payload) => vec![payload],
            Returned::Events(payloads) => payloads,
            other => return Err(DispatchError::UnexpectedReturn(other.kind()).into()),
        };
        if payloads.is_empty() {
            return Err(EmbeddingError::NoEventsReturned {
                role,
                method: method.to_owned(),
            });
        }

        let event_source = EventSourceId::new(context.key.as_str());
        let mut events = UncommittedEvents::new();
        for payload in &payloads {
            let (event_type, content) = self.registry.serialize(payload)?;
            events.push(UncommittedEvent {
                event_source: event_source.clone(),
                event_type,
                content,
                is_public: false,
            })?;
        }
        debug!(%role, method, events = events.len(), "reconciled embedding");
        Ok(events)
    }
}

impl<R> fmt::Debug for Embedding<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Embedding")
            .field("id", &self.id)
            .field("alias", &self.alias)
            .field("event_types", &self.handlers.keys().collect::<Vec<_>>())
            .field("update", &self.update.method)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use tributary_core::event::{Event, EventPayload};
    use tributary_core::clock::Clock;
    use tributary_core::execution::ExecutionContext;
    use tributary_core::identity::{EventLogSequenceNumber, PartitionId};
    use tributary_test_support::FixedClock;
    use uuid::Uuid;

    use super::*;
    use crate::domain::context::{EventContext, ProjectionContext};
    use crate::domain::method::{Decoration, HandlerError, MethodDeclaration};
    use crate::domain::verdict::Verdict;

    const EMPLOYEE_HIRED: Uuid = Uuid::from_u128(0x0b2c_5e7a_0001);
    const EMPLOYEE_TRANSFERRED: Uuid = Uuid::from_u128(0x0b2c_5e7a_0002);
    const EMPLOYEE_RETIRED: Uuid = Uuid::from_u128(0x0b2c_5e7a_0003);

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct EmployeeHired {
        name: String,
        workplace: String,
    }

    impl Event for EmployeeHired {}

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct EmployeeTransferred {
        from: String,
        to: String,
    }

    impl Event for EmployeeTransferred {}

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct EmployeeRetired {
        name: String,
    }

    impl Event for EmployeeRetired {}

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Employee {
        name: String,
        workplace: String,
    }

    impl ReadModel for Employee {
        fn methods() -> Vec<MethodDeclaration<Self>> {
            vec![
                MethodDeclaration::handling(
                    "On",
                    |employee: &mut Self, event: &EmployeeHired, _: &ProjectionContext| {
                        employee.name.clone_from(&event.name);
                        employee.workplace.clone_from(&event.workplace);
                    },
                ),
                MethodDeclaration::handling(
                    "Transferred",
                    |employee: &mut Self, event: &EmployeeTransferred, _: &ProjectionContext| {
                        employee.workplace.clone_from(&event.to);
                    },
                )
                .decorated(Decoration::on()),
                MethodDeclaration::receiving_state(
                    "ResolveUpdateToEvents",
                    |current: &Self, received: &Self, _: &EmbeddingContext| {
                        if current.name.is_empty() {
                            return vec![EventPayload::new(EmployeeHired {
                                name: received.name.clone(),
                                workplace: received.workplace.clone(),
                            })];
                        }
                        if current.workplace == received.workplace {
                            return Vec::new();
                        }
                        vec![EventPayload::new(EmployeeTransferred {
                            from: current.workplace.clone(),
                            to: received.workplace.clone(),
                        })]
                    },
                ),
                MethodDeclaration::with_context_async(
                    "ResolveDeletionToEvents",
                    |current: Self, _: EmbeddingContext| async move {
                        if current.name == "nobody" {
                            return Err(HandlerFailure);
                        }
                        Ok(EventPayload::new(EmployeeRetired { name: current.name }))
                    },
                ),
            ]
        }
    }

    #[derive(Debug, Error)]
    #[error("cannot retire nobody")]
    struct HandlerFailure;

    fn registry() -> Arc<EventTypeRegistry> {
        let mut registry = EventTypeRegistry::new();
        registry
            .associate::<EmployeeHired>(EventType::new(EMPLOYEE_HIRED))
            .unwrap();
        registry
            .associate::<EmployeeTransferred>(EventType::new(EMPLOYEE_TRANSFERRED))
            .unwrap();
        registry
            .associate::<EmployeeRetired>(EventType::new(EMPLOYEE_RETIRED))
            .unwrap();
        Arc::new(registry)
    }

    fn embedding() -> Embedding<Employee> {
        EmbeddingBuilder::new(EmbeddingId(Uuid::from_u128(77)))
            .with_alias("employees")
            .build(registry())
            .unwrap()
    }

    fn context() -> EmbeddingContext {
        EmbeddingContext::new(EmbeddingKey::from("employee-7"), ExecutionContext::default())
    }

    fn employee(name: &str, workplace: &str) -> Employee {
        Employee {
            name: name.to_owned(),
            workplace: workplace.to_owned(),
        }
    }

    #[tokio::test]
    async fn test_update_wraps_events_for_the_embedding_key() {
        // Arrange
        let embedding = embedding();

        // Act
        let events = embedding
            .update(employee("ada", "oslo"), employee("ada", "bergen"), context())
            .await
            .unwrap();

        // Assert
        assert_eq!(events.len(), 1);
        let event = &events.as_slice()[0];
        assert_eq!(event.event_source, EventSourceId::from("employee-7"));
        assert_eq!(event.event_type, EventType::new(EMPLOYEE_TRANSFERRED));
        assert_eq!(event.content, json!({ "from": "oslo", "to": "bergen" }));
        assert!(!event.is_public);
    }

    #[tokio::test]
    async fn test_update_returning_no_events_is_rejected() {
        let embedding = embedding();

        let result = embedding
            .update(employee("ada", "oslo"), employee("ada", "oslo"), context())
            .await;

        match result {
            Err(EmbeddingError::NoEventsReturned { role, method }) => {
                assert_eq!(role, Role::Update);
                assert_eq!(method, "ResolveUpdateToEvents");
            }
            other => panic!("expected NoEventsReturned, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_async_delete_wraps_single_event() {
        let embedding = embedding();

        let events = embedding
            .delete(employee("ada", "oslo"), context())
            .await
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(
            events.as_slice()[0].event_type,
            EventType::new(EMPLOYEE_RETIRED)
        );
    }

    #[tokio::test]
    async fn test_delete_error_is_returned() {
        let embedding = embedding();

        let result = embedding.delete(employee("nobody", ""), context()).await;

        assert!(matches!(
            result,
            Err(EmbeddingError::Dispatch(DispatchError::Handler(
                HandlerError::Failed(_)
            )))
        ));
    }

    #[tokio::test]
    async fn test_undeclared_roles_are_reported() {
        let embedding = embedding();

        let compared = embedding
            .compare(Employee::default(), employee("ada", "oslo"), context())
            .await;
        let removed = embedding.remove(Employee::default(), context()).await;

        assert!(matches!(
            compared,
            Err(EmbeddingError::MethodNotDeclared {
                role: Role::Compare
            })
        ));
        assert!(matches!(
            removed,
            Err(EmbeddingError::MethodNotDeclared {
                role: Role::Remove
            })
        ));
        assert!(embedding.declares(Role::Delete));
        assert!(!embedding.declares(Role::Compare));
    }

    #[tokio::test]
    async fn test_on_applies_committed_embedding_events() {
        // Arrange
        let embedding = embedding();
        let event = ProjectedEvent::new(
            EventType::new(EMPLOYEE_HIRED),
            EventPayload::new(EmployeeHired {
                name: "ada".to_owned(),
                workplace: "oslo".to_owned(),
            }),
            json!({ "name": "ada", "workplace": "oslo" }),
            EventContext {
                sequence_number: EventLogSequenceNumber(4),
                event_source: EventSourceId::from("employee-7"),
                partition: PartitionId::default(),
                occurred: FixedClock::default().now(),
                execution_context: ExecutionContext::default(),
            },
        );

        // Act
        let dispatched = embedding
            .on(
                None,
                &event,
                EmbeddingKey::from("employee-7"),
                &CancellationToken::new(),
            )
            .await;

        // Assert
        assert_eq!(
            dispatched.key.as_ref().map(|key| key.as_str()),
            Some("employee-7")
        );
        match dispatched.verdict {
            Verdict::Replace(state) => assert_eq!(state, employee("ada", "oslo")),
            other => panic!("expected Replace, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_context_fails_reconciliation() {
        let embedding = embedding();
        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let result = embedding
            .update(
                Employee::default(),
                employee("ada", "oslo"),
                context().with_cancellation(cancellation),
            )
            .await;

        assert!(matches!(
            result,
            Err(EmbeddingError::Dispatch(DispatchError::Cancelled))
        ));
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Contractor {
        name: String,
        workplace: String,
    }

    impl ReadModel for Contractor {
        fn methods() -> Vec<MethodDeclaration<Self>> {
            vec![
                MethodDeclaration::receiving_state_async(
                    "ResolveUpdateToEvents",
                    |_: Self, received: Self, _: EmbeddingContext| {
                        assert!(received.name != "ghost", "ghost contractor");
                        async move {
                            EventPayload::new(EmployeeHired {
                                name: received.name,
                                workplace: received.workplace,
                            })
                        }
                    },
                ),
                MethodDeclaration::receiving_state(
                    "Compare",
                    |current: &Self, received: &Self, _: &EmbeddingContext| {
                        EventPayload::new(EmployeeTransferred {
                            from: current.workplace.clone(),
                            to: received.workplace.clone(),
                        })
                    },
                ),
                MethodDeclaration::with_context_async(
                    "ResolveDeletionToEvents",
                    |current: Self, _: EmbeddingContext| {
                        assert!(!current.name.is_empty(), "contract already ended");
                        async move { EventPayload::new(EmployeeRetired { name: current.name }) }
                    },
                ),
                MethodDeclaration::with_context(
                    "Remove",
                    |current: &Self, _: &EmbeddingContext| {
                        vec![
                            EventPayload::new(EmployeeTransferred {
                                from: current.workplace.clone(),
                                to: String::new(),
                            }),
                            EventPayload::new(EmployeeRetired {
                                name: current.name.clone(),
                            }),
                        ]
                    },
                ),
            ]
        }
    }

    fn contractors() -> Embedding<Contractor> {
        EmbeddingBuilder::new(EmbeddingId(Uuid::from_u128(78)))
            .build(registry())
            .unwrap()
    }

    fn contractor(name: &str, workplace: &str) -> Contractor {
        Contractor {
            name: name.to_owned(),
            workplace: workplace.to_owned(),
        }
    }

    #[tokio::test]
    async fn test_compare_wraps_single_event_for_the_embedding_key() {
        // Arrange
        let embedding = contractors();

        // Act
        let events = embedding
            .compare(
                contractor("grace", "oslo"),
                contractor("grace", "bergen"),
                context(),
            )
            .await
            .unwrap();

        // Assert
        assert_eq!(events.len(), 1);
        let event = &events.as_slice()[0];
        assert_eq!(event.event_source, EventSourceId::from("employee-7"));
        assert_eq!(event.event_type, EventType::new(EMPLOYEE_TRANSFERRED));
        assert_eq!(event.content, json!({ "from": "oslo", "to": "bergen" }));
        assert!(!event.is_public);
    }

    #[tokio::test]
    async fn test_remove_wraps_every_returned_event_in_order() {
        let embedding = contractors();

        let events = embedding
            .remove(contractor("grace", "oslo"), context())
            .await
            .unwrap();

        let events = events.as_slice();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::new(EMPLOYEE_TRANSFERRED));
        assert_eq!(events[0].content, json!({ "from": "oslo", "to": "" }));
        assert_eq!(events[1].event_type, EventType::new(EMPLOYEE_RETIRED));
        assert_eq!(events[1].content, json!({ "name": "grace" }));
        assert!(events.iter().all(|event| !event.is_public));
        assert!(
            events
                .iter()
                .all(|event| event.event_source == EventSourceId::from("employee-7"))
        );
    }

    #[tokio::test]
    async fn test_async_reconciliation_panicking_before_awaiting_is_returned() {
        // Arrange
        let embedding = contractors();

        // Act
        let updated = embedding
            .update(Contractor::default(), contractor("ghost", "oslo"), context())
            .await;
        let deleted = embedding.delete(Contractor::default(), context()).await;

        // Assert
        match updated {
            Err(EmbeddingError::Dispatch(DispatchError::Handler(HandlerError::Panicked(
                message,
            )))) => assert_eq!(message, "ghost contractor"),
            other => panic!("expected Panicked, got {other:?}"),
        }
        match deleted {
            Err(EmbeddingError::Dispatch(DispatchError::Handler(HandlerError::Panicked(
                message,
            )))) => assert_eq!(message, "contract already ended"),
            other => panic!("expected Panicked, got {other:?}"),
        }
    }

    #[derive(Debug, Default)]
    struct NoUpdate;

    impl ReadModel for NoUpdate {
        fn methods() -> Vec<MethodDeclaration<Self>> {
            vec![MethodDeclaration::handling(
                "On",
                |_: &mut Self, _: &EmployeeHired, _: &ProjectionContext| {},
            )]
        }
    }

    #[test]
    fn test_embedding_without_update_is_rejected() {
        let result =
            EmbeddingBuilder::<NoUpdate>::new(EmbeddingId(Uuid::from_u128(1))).build(registry());

        match result {
            Err(failed) => assert_eq!(
                failed.diagnostics,
                vec![Diagnostic::MissingMethod { role: Role::Update }]
            ),
            Ok(embedding) => panic!("expected rejection, got {embedding:?}"),
        }
    }
}
