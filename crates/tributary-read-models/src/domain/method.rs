//! Handler method declarations.
//!
//! A declaration pairs a name, an optional role decoration and key selectors
//! with a signature and a body. The shape constructors
//! ([`MethodDeclaration::handling`], [`MethodDeclaration::receiving_state`],
//! [`MethodDeclaration::with_context`] and their variants) record the
//! signature as data and lift the handler into one canonical boxed async
//! form, so resolution only has to inspect data.

use std::any::{Any, TypeId, type_name};
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use tributary_core::event::{Event, EventPayload, EventType};

use super::context::{EmbeddingContext, ProjectionContext};
use super::key_selector::KeySelector;
use super::verdict::ProjectionResultType;

/// The future every handler is lifted into.
pub type HandlerFuture<T> = Pin<Box<dyn Future<Output = Result<T, HandlerError>> + Send>>;

pub(crate) type EventFn<R> =
    dyn Fn(R, EventPayload, ProjectionContext) -> HandlerFuture<(R, Returned)> + Send + Sync;
pub(crate) type ReceivedStateFn<R> =
    dyn Fn(R, R, EmbeddingContext) -> HandlerFuture<Returned> + Send + Sync;
pub(crate) type ContextFn<R> = dyn Fn(R, EmbeddingContext) -> HandlerFuture<Returned> + Send + Sync;

/// Errors raised by a handler invocation.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler returned an error.
    #[error("handler failed: {0}")]
    Failed(#[source] Box<dyn StdError + Send + Sync>),

    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// The payload is not of the type the handler takes.
    #[error("handler for {expected} received {actual}")]
    WrongEventType {
        /// The type the handler takes.
        expected: &'static str,
        /// The type of the payload.
        actual: &'static str,
    },
}

impl HandlerError {
    fn wrong_event_type<E>(payload: &EventPayload) -> Self {
        Self::WrongEventType {
            expected: type_name::<E>(),
            actual: payload.type_name(),
        }
    }
}

/// Extracts the message of a caught panic.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// The role a method plays in a read model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    /// Applies an event to the read model.
    On,
    /// Compares the received state with the current state.
    Compare,
    /// Produces the events that turn the current state into the received state.
    Update,
    /// Produces the events that delete the read model.
    Delete,
    /// Produces the events that remove the read model.
    Remove,
}

impl Role {
    /// Every role, in resolution order.
    pub const ALL: [Self; 5] = [
        Self::On,
        Self::Compare,
        Self::Update,
        Self::Delete,
        Self::Remove,
    ];

    /// The method name that selects this role without a decoration.
    #[must_use]
    pub const fn conventional_name(self) -> &'static str {
        match self {
            Self::On => "On",
            Self::Compare => "Compare",
            Self::Update => "ResolveUpdateToEvents",
            Self::Delete => "ResolveDeletionToEvents",
            Self::Remove => "Remove",
        }
    }

    /// Returns the role whose conventional name is `name`.
    #[must_use]
    pub fn from_conventional_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|role| role.conventional_name() == name)
    }

    /// Returns `true` for roles a read model declares at most once.
    #[must_use]
    pub const fn is_singular(self) -> bool {
        !matches!(self, Self::On)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::On => "On",
            Self::Compare => "Compare",
            Self::Update => "Update",
            Self::Delete => "Delete",
            Self::Remove => "Remove",
        };
        f.write_str(name)
    }
}

/// An explicit role marker on a method.
///
/// A decoration takes precedence over the method name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoration {
    /// The role the method plays.
    pub role: Role,
    /// The event type an `On` method handles, for untyped event parameters.
    pub event_type: Option<EventType>,
}

impl Decoration {
    /// Marks an `On` method.
    #[must_use]
    pub const fn on() -> Self {
        Self::new(Role::On)
    }

    /// Marks a `Compare` method.
    #[must_use]
    pub const fn compare() -> Self {
        Self::new(Role::Compare)
    }

    /// Marks an `Update` method.
    #[must_use]
    pub const fn update() -> Self {
        Self::new(Role::Update)
    }

    /// Marks a `Delete` method.
    #[must_use]
    pub const fn delete() -> Self {
        Self::new(Role::Delete)
    }

    /// Marks a `Remove` method.
    #[must_use]
    pub const fn remove() -> Self {
        Self::new(Role::Remove)
    }

    const fn new(role: Role) -> Self {
        Self {
            role,
            event_type: None,
        }
    }

    /// Names the event type the method handles.
    #[must_use]
    pub fn with_event_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }
}

/// How a handler takes its event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventParameter {
    /// Any payload; the event type must be named by the decoration.
    Untyped,
    /// A concrete event type, resolved through the registry.
    Typed {
        /// `TypeId` of the event type.
        type_id: TypeId,
        /// Rust name of the event type.
        type_name: &'static str,
    },
}

/// One parameter of a handler, after the read model state itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    /// The state received from outside, for embedding reconciliation.
    ReceivedState,
    /// The event being handled.
    Event(EventParameter),
    /// The invocation context.
    Context,
}

impl Parameter {
    /// Returns the kind of the parameter.
    #[must_use]
    pub const fn kind(self) -> ParameterKind {
        match self {
            Self::ReceivedState => ParameterKind::ReceivedState,
            Self::Event(_) => ParameterKind::Event,
            Self::Context => ParameterKind::Context,
        }
    }
}

/// Kind of a handler parameter, ignoring event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    /// See [`Parameter::ReceivedState`].
    ReceivedState,
    /// See [`Parameter::Event`].
    Event,
    /// See [`Parameter::Context`].
    Context,
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReceivedState => "received state",
            Self::Event => "event",
            Self::Context => "context",
        };
        f.write_str(name)
    }
}

/// What a handler returns, ignoring errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    /// Nothing.
    Void,
    /// A [`ProjectionResultType`].
    ResultType,
    /// A single event.
    Event,
    /// A list of events.
    Events,
}

impl fmt::Display for ReturnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Void => "()",
            Self::ResultType => "ProjectionResultType",
            Self::Event => "EventPayload",
            Self::Events => "Vec<EventPayload>",
        };
        f.write_str(name)
    }
}

/// The declared return of a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnShape {
    /// What is returned.
    pub kind: ReturnKind,
    /// Whether it is returned from a future.
    pub asynchronous: bool,
}

impl ReturnShape {
    fn of<T: HandlerReturn>(asynchronous: bool) -> Self {
        Self {
            kind: T::KIND,
            asynchronous,
        }
    }
}

impl fmt::Display for ReturnShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.asynchronous {
            write!(f, "impl Future<Output = {}>", self.kind)
        } else {
            self.kind.fmt(f)
        }
    }
}

/// Parameters and return shape of a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Parameters after the read model state.
    pub parameters: Vec<Parameter>,
    /// The return shape.
    pub returns: ReturnShape,
}

impl Signature {
    /// Returns the parameter kinds, in order.
    #[must_use]
    pub fn parameter_kinds(&self) -> Vec<ParameterKind> {
        self.parameters.iter().map(|parameter| parameter.kind()).collect()
    }

    /// Returns the event parameter, if the handler takes one.
    #[must_use]
    pub fn event_parameter(&self) -> Option<EventParameter> {
        self.parameters.iter().find_map(|parameter| match parameter {
            Parameter::Event(event) => Some(*event),
            _ => None,
        })
    }
}

/// A handler's return value after normalization.
#[derive(Debug)]
pub enum Returned {
    /// Nothing was returned.
    Void,
    /// An explicit projection result.
    ResultType(ProjectionResultType),
    /// A single event.
    Event(EventPayload),
    /// A list of events.
    Events(Vec<EventPayload>),
}

impl Returned {
    /// Returns the kind of value returned.
    #[must_use]
    pub const fn kind(&self) -> ReturnKind {
        match self {
            Self::Void => ReturnKind::Void,
            Self::ResultType(_) => ReturnKind::ResultType,
            Self::Event(_) => ReturnKind::Event,
            Self::Events(_) => ReturnKind::Events,
        }
    }
}

/// Values a handler may return.
///
/// Implemented for `()`, [`ProjectionResultType`], [`EventPayload`],
/// `Vec<EventPayload>`, and `Result` of any of these with an error type.
pub trait HandlerReturn: Send + 'static {
    /// The kind recorded in the handler's signature.
    const KIND: ReturnKind;

    /// Normalizes the value.
    ///
    /// # Errors
    ///
    /// Returns `HandlerError::Failed` if the handler returned an error.
    fn into_returned(self) -> Result<Returned, HandlerError>;
}

impl HandlerReturn for () {
    const KIND: ReturnKind = ReturnKind::Void;

    fn into_returned(self) -> Result<Returned, HandlerError> {
        Ok(Returned::Void)
    }
}

impl HandlerReturn for ProjectionResultType {
    const KIND: ReturnKind = ReturnKind::ResultType;

    fn into_returned(self) -> Result<Returned, HandlerError> {
        Ok(Returned::ResultType(self))
    }
}

impl HandlerReturn for EventPayload {
    const KIND: ReturnKind = ReturnKind::Event;

    fn into_returned(self) -> Result<Returned, HandlerError> {
        Ok(Returned::Event(self))
    }
}

impl HandlerReturn for Vec<EventPayload> {
    const KIND: ReturnKind = ReturnKind::Events;

    fn into_returned(self) -> Result<Returned, HandlerError> {
        Ok(Returned::Events(self))
    }
}

impl<T, E> HandlerReturn for Result<T, E>
where
    T: HandlerReturn,
    E: StdError + Send + Sync + 'static,
{
    const KIND: ReturnKind = T::KIND;

    fn into_returned(self) -> Result<Returned, HandlerError> {
        match self {
            Ok(value) => value.into_returned(),
            Err(error) => Err(HandlerError::Failed(Box::new(error))),
        }
    }
}

pub(crate) enum MethodBody<R> {
    Event(Arc<EventFn<R>>),
    ReceivedState(Arc<ReceivedStateFn<R>>),
    Context(Arc<ContextFn<R>>),
}

fn boxed<T>(
    future: impl Future<Output = Result<T, HandlerError>> + Send + 'static,
) -> HandlerFuture<T> {
    Box::pin(future)
}

/// A handler method of read model `R`.
pub struct MethodDeclaration<R> {
    name: String,
    decoration: Option<Decoration>,
    key_selectors: Vec<KeySelector>,
    signature: Signature,
    body: MethodBody<R>,
}

impl<R: Send + 'static> MethodDeclaration<R> {
    fn new(
        name: impl Into<String>,
        parameters: Vec<Parameter>,
        returns: ReturnShape,
        body: MethodBody<R>,
    ) -> Self {
        Self {
            name: name.into(),
            decoration: None,
            key_selectors: Vec::new(),
            signature: Signature {
                parameters,
                returns,
            },
            body,
        }
    }

    fn typed<E: Event>() -> Parameter {
        Parameter::Event(EventParameter::Typed {
            type_id: TypeId::of::<E>(),
            type_name: type_name::<E>(),
        })
    }

    /// Declares a handler taking `(state, event, context)` with a typed event.
    pub fn handling<E, T, F>(name: impl Into<String>, handler: F) -> Self
    where
        E: Event,
        T: HandlerReturn,
        F: Fn(&mut R, &E, &ProjectionContext) -> T + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let body: Arc<EventFn<R>> = Arc::new(
            move |mut state: R, payload: EventPayload, context: ProjectionContext| {
                let handler = Arc::clone(&handler);
                boxed(async move {
                    let event = payload
                        .downcast_ref::<E>()
                        .ok_or_else(|| HandlerError::wrong_event_type::<E>(&payload))?;
                    let returned = handler(&mut state, event, &context).into_returned()?;
                    Ok((state, returned))
                })
            },
        );
        Self::new(
            name,
            vec![Self::typed::<E>(), Parameter::Context],
            ReturnShape::of::<T>(false),
            MethodBody::Event(body),
        )
    }

    /// Declares an async handler taking `(state, event, context)` with a typed
    /// event. The future hands the state back with its result.
    pub fn handling_async<E, T, F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        E: Event,
        T: HandlerReturn,
        F: Fn(R, E, ProjectionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = (R, T)> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let body: Arc<EventFn<R>> = Arc::new(
            move |state: R, payload: EventPayload, context: ProjectionContext| {
                let handler = Arc::clone(&handler);
                boxed(async move {
                    let event = payload
                        .downcast_ref::<E>()
                        .cloned()
                        .ok_or_else(|| HandlerError::wrong_event_type::<E>(&payload))?;
                    let (state, returned) = handler(state, event, context).await;
                    Ok((state, returned.into_returned()?))
                })
            },
        );
        Self::new(
            name,
            vec![Self::typed::<E>(), Parameter::Context],
            ReturnShape::of::<T>(true),
            MethodBody::Event(body),
        )
    }

    /// Declares a handler taking `(state, payload, context)` for any payload.
    ///
    /// The handled event type must be named with [`Decoration::with_event_type`].
    pub fn handling_untyped<T, F>(name: impl Into<String>, handler: F) -> Self
    where
        T: HandlerReturn,
        F: Fn(&mut R, &EventPayload, &ProjectionContext) -> T + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let body: Arc<EventFn<R>> = Arc::new(
            move |mut state: R, payload: EventPayload, context: ProjectionContext| {
                let handler = Arc::clone(&handler);
                boxed(async move {
                    let returned = handler(&mut state, &payload, &context).into_returned()?;
                    Ok((state, returned))
                })
            },
        );
        Self::new(
            name,
            vec![Parameter::Event(EventParameter::Untyped), Parameter::Context],
            ReturnShape::of::<T>(false),
            MethodBody::Event(body),
        )
    }

    /// Async form of [`handling_untyped`](Self::handling_untyped).
    pub fn handling_untyped_async<T, F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        T: HandlerReturn,
        F: Fn(R, EventPayload, ProjectionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = (R, T)> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let body: Arc<EventFn<R>> = Arc::new(
            move |state: R, payload: EventPayload, context: ProjectionContext| {
                let handler = Arc::clone(&handler);
                boxed(async move {
                    let (state, returned) = handler(state, payload, context).await;
                    Ok((state, returned.into_returned()?))
                })
            },
        );
        Self::new(
            name,
            vec![Parameter::Event(EventParameter::Untyped), Parameter::Context],
            ReturnShape::of::<T>(true),
            MethodBody::Event(body),
        )
    }

    /// Declares a handler taking `(state, received state, context)`.
    pub fn receiving_state<T, F>(name: impl Into<String>, handler: F) -> Self
    where
        T: HandlerReturn,
        F: Fn(&R, &R, &EmbeddingContext) -> T + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let body: Arc<ReceivedStateFn<R>> = Arc::new(
            move |current: R, received: R, context: EmbeddingContext| {
                let handler = Arc::clone(&handler);
                boxed(async move { handler(&current, &received, &context).into_returned() })
            },
        );
        Self::new(
            name,
            vec![Parameter::ReceivedState, Parameter::Context],
            ReturnShape::of::<T>(false),
            MethodBody::ReceivedState(body),
        )
    }

    /// Async form of [`receiving_state`](Self::receiving_state).
    pub fn receiving_state_async<T, F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        T: HandlerReturn,
        F: Fn(R, R, EmbeddingContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let body: Arc<ReceivedStateFn<R>> = Arc::new(
            move |current: R, received: R, context: EmbeddingContext| {
                let handler = Arc::clone(&handler);
                boxed(async move { handler(current, received, context).await.into_returned() })
            },
        );
        Self::new(
            name,
            vec![Parameter::ReceivedState, Parameter::Context],
            ReturnShape::of::<T>(true),
            MethodBody::ReceivedState(body),
        )
    }

    /// Declares a handler taking `(state, context)`.
    pub fn with_context<T, F>(name: impl Into<String>, handler: F) -> Self
    where
        T: HandlerReturn,
        F: Fn(&R, &EmbeddingContext) -> T + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let body: Arc<ContextFn<R>> = Arc::new(move |current: R, context: EmbeddingContext| {
            let handler = Arc::clone(&handler);
            boxed(async move { handler(&current, &context).into_returned() })
        });
        Self::new(
            name,
            vec![Parameter::Context],
            ReturnShape::of::<T>(false),
            MethodBody::Context(body),
        )
    }

    /// Async form of [`with_context`](Self::with_context).
    pub fn with_context_async<T, F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        T: HandlerReturn,
        F: Fn(R, EmbeddingContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let body: Arc<ContextFn<R>> = Arc::new(move |current: R, context: EmbeddingContext| {
            let handler = Arc::clone(&handler);
            boxed(async move { handler(current, context).await.into_returned() })
        });
        Self::new(
            name,
            vec![Parameter::Context],
            ReturnShape::of::<T>(true),
            MethodBody::Context(body),
        )
    }
}

impl<R> MethodDeclaration<R> {
    /// Marks the method with an explicit role.
    #[must_use]
    pub fn decorated(mut self, decoration: Decoration) -> Self {
        self.decoration = Some(decoration);
        self
    }

    /// Adds a key selector.
    #[must_use]
    pub fn with_key_selector(mut self, key_selector: KeySelector) -> Self {
        self.key_selectors.push(key_selector);
        self
    }

    /// The method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The decoration, if any.
    #[must_use]
    pub fn decoration(&self) -> Option<&Decoration> {
        self.decoration.as_ref()
    }

    /// The key selectors, in declaration order.
    #[must_use]
    pub fn key_selectors(&self) -> &[KeySelector] {
        &self.key_selectors
    }

    /// The declared signature.
    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// The role the method plays: its decoration, else its conventional name.
    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.decoration
            .as_ref()
            .map(|decoration| decoration.role)
            .or_else(|| Role::from_conventional_name(&self.name))
    }

    pub(crate) fn into_body(self) -> MethodBody<R> {
        self.body
    }
}

impl<R> fmt::Debug for MethodDeclaration<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDeclaration")
            .field("name", &self.name)
            .field("decoration", &self.decoration)
            .field("key_selectors", &self.key_selectors)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}
