//! Projections: read models kept current by `On` handlers.

use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use tracing::{debug, instrument};
use tributary_core::cancellation::CancellationToken;
use tributary_core::event::EventType;
use tributary_core::registry::EventTypeRegistry;

use super::diagnostics::ResolutionFailed;
use super::dispatch::apply_event;
use super::resolver::{EventHandler, ReadModelKind, resolve, single_key_selector};
use crate::domain::ids::{ProjectionId, ScopeId};
use crate::domain::key_selector::KeySelector;
use crate::domain::projected_event::ProjectedEvent;
use crate::domain::read_model::ReadModel;
use crate::domain::verdict::{DispatchError, Dispatched, Verdict};

/// A resolved projection `On` handler.
pub type ProjectionHandler<R> = EventHandler<R, KeySelector>;

/// Builds a [`Projection`] of read model `R`.
pub struct ProjectionBuilder<R> {
    id: ProjectionId,
    scope: ScopeId,
    alias: Option<String>,
    read_model: PhantomData<fn() -> R>,
}

impl<R: ReadModel> ProjectionBuilder<R> {
    /// Starts a projection in the default scope.
    #[must_use]
    pub fn new(id: ProjectionId) -> Self {
        Self {
            id,
            scope: ScopeId::DEFAULT,
            alias: None,
            read_model: PhantomData,
        }
    }

    /// Reads events from `scope` instead of the default scope.
    #[must_use]
    pub fn in_scope(mut self, scope: ScopeId) -> Self {
        self.scope = scope;
        self
    }

    /// Names the projection for humans.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Resolves the handlers of `R` against `registry`.
    ///
    /// # Errors
    ///
    /// Returns `ResolutionFailed` with every problem found in the
    /// declarations; nothing is partially built.
    pub fn build(self, registry: &EventTypeRegistry) -> Result<Projection<R>, ResolutionFailed> {
        let resolved = resolve::<R, KeySelector>(
            ReadModelKind::Projection,
            registry,
            single_key_selector,
        )?;
        debug!(
            projection = %self.id,
            read_model = type_name::<R>(),
            handlers = resolved.handlers.len(),
            "projection resolved"
        );
        Ok(Projection {
            id: self.id,
            scope: self.scope,
            alias: self.alias,
            handlers: resolved.handlers,
        })
    }
}

/// A projection with one handler per event type.
pub struct Projection<R> {
    id: ProjectionId,
    scope: ScopeId,
    alias: Option<String>,
    handlers: HashMap<EventType, ProjectionHandler<R>>,
}

impl<R: ReadModel> Projection<R> {
    /// The projection id.
    #[must_use]
    pub fn id(&self) -> ProjectionId {
        self.id
    }

    /// The scope events are read from.
    #[must_use]
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// The alias, if any.
    #[must_use]
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// The event types the projection handles.
    pub fn event_types(&self) -> impl Iterator<Item = &EventType> {
        self.handlers.keys()
    }

    /// The handler for `event_type`.
    #[must_use]
    pub fn handler(&self, event_type: &EventType) -> Option<&ProjectionHandler<R>> {
        self.handlers.get(event_type)
    }

    /// Applies `event` to the read model instance it selects.
    ///
    /// `state` is the stored state for that instance, or `None` if there is
    /// none yet, in which case the handler receives `R::default()`. Failures
    /// never escape: they are returned as [`Verdict::Fail`].
    #[instrument(skip_all, fields(projection = %self.id, event_type = %event.event_type))]
    pub async fn apply(
        &self,
        state: Option<R>,
        event: &ProjectedEvent,
        cancellation: &CancellationToken,
    ) -> Dispatched<R> {
        let Some(handler) = self.handlers.get(&event.event_type) else {
            return Dispatched::failed(
                None,
                DispatchError::NoHandlerForEventType(event.event_type.clone()),
            );
        };
        let key = match handler.key().key_for(event) {
            Ok(key) => key,
            Err(error) => return Dispatched::failed(None, error.into()),
        };

        let verdict = apply_event(&handler.handle, state, event, key.clone(), cancellation).await;
        match &verdict {
            Verdict::Fail(error) => debug!(%key, %error, "projection handler failed"),
            Verdict::Replace(_) | Verdict::Delete => debug!(%key, "projection handler applied"),
        }
        Dispatched {
            key: Some(key),
            verdict,
        }
    }
}

impl<R> fmt::Debug for Projection<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projection")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("alias", &self.alias)
            .field("event_types", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
