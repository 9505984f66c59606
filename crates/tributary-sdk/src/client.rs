//! Client composition: one registry shared by read models and the event store.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};
use tributary_core::event::{Event, EventType};
use tributary_core::registry::EventTypeRegistry;
use tributary_core::runtime::EventStoreRuntime;
use tributary_event_store::event_store::EventStore;
use tributary_read_models::application::diagnostics::ResolutionFailed;
use tributary_read_models::application::embedding::{Embedding, EmbeddingBuilder};
use tributary_read_models::application::projection::{Projection, ProjectionBuilder};
use tributary_read_models::domain::read_model::ReadModel;

use crate::config::SdkConfig;
use crate::error::ClientError;

type PendingReadModel =
    Box<dyn FnOnce(&Arc<EventTypeRegistry>) -> Result<ResolvedReadModel, ResolutionFailed> + Send>;

struct ResolvedReadModel {
    type_id: TypeId,
    read_model: Arc<dyn Any + Send + Sync>,
}

/// Collects event types and read models, then builds a [`Client`].
///
/// Read models are resolved at [`build`](Self::build) time, after every
/// event type has been associated.
pub struct ClientBuilder {
    config: SdkConfig,
    registry: EventTypeRegistry,
    pending: Vec<PendingReadModel>,
}

impl ClientBuilder {
    /// Starts a builder for `config`.
    #[must_use]
    pub fn new(config: SdkConfig) -> Self {
        Self {
            config,
            registry: EventTypeRegistry::new(),
            pending: Vec::new(),
        }
    }

    /// Associates `E` with `event_type`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Registry` if either side is already associated
    /// elsewhere or `E` declares a different event type.
    pub fn register_event<E: Event>(mut self, event_type: EventType) -> Result<Self, ClientError> {
        self.registry.associate::<E>(event_type.clone())?;
        info!(%event_type, type_name = type_name::<E>(), "event type registered");
        Ok(self)
    }

    /// Associates `E` with the event type it declares.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Registry` if `E` declares no event type or the
    /// association conflicts.
    pub fn register_declared_event<E: Event>(mut self) -> Result<Self, ClientError> {
        let event_type = self.registry.associate_declared::<E>()?;
        info!(%event_type, type_name = type_name::<E>(), "event type registered");
        Ok(self)
    }

    /// Adds a projection, resolved when the client is built.
    #[must_use]
    pub fn register_projection<R: ReadModel>(mut self, projection: ProjectionBuilder<R>) -> Self {
        self.pending.push(Box::new(move |registry: &Arc<EventTypeRegistry>| {
            let projection = projection.build(registry)?;
            info!(
                projection = %projection.id(),
                read_model = type_name::<R>(),
                "projection registered"
            );
            Ok(ResolvedReadModel {
                type_id: TypeId::of::<Projection<R>>(),
                read_model: Arc::new(projection),
            })
        }));
        self
    }

    /// Adds an embedding, resolved when the client is built.
    #[must_use]
    pub fn register_embedding<R: ReadModel>(mut self, embedding: EmbeddingBuilder<R>) -> Self {
        self.pending.push(Box::new(move |registry: &Arc<EventTypeRegistry>| {
            let embedding = embedding.build(Arc::clone(registry))?;
            info!(
                embedding = %embedding.id(),
                read_model = type_name::<R>(),
                "embedding registered"
            );
            Ok(ResolvedReadModel {
                type_id: TypeId::of::<Embedding<R>>(),
                read_model: Arc::new(embedding),
            })
        }));
        self
    }

    /// Builds the client over `runtime`.
    ///
    /// Read models whose declarations are rejected are skipped; the warnings
    /// name every diagnostic and [`Client::rejected`] lists them.
    #[must_use]
    pub fn build(self, runtime: Arc<dyn EventStoreRuntime>) -> Client {
        let (registry, config, pending) = self.into_parts();
        let mut read_models = HashMap::new();
        let mut rejected = Vec::new();
        for resolve in pending {
            match resolve(&registry) {
                Ok(resolved) => {
                    read_models.insert(resolved.type_id, resolved.read_model);
                }
                Err(failed) => {
                    warn!(read_model = failed.read_model, "skipping rejected read model");
                    rejected.push(failed);
                }
            }
        }
        Client::new(config, registry, runtime, read_models, rejected)
    }

    /// Builds the client over `runtime`, failing on the first rejected read
    /// model.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ReadModelRejected` with the diagnostics of the
    /// first read model that does not resolve.
    pub fn try_build(self, runtime: Arc<dyn EventStoreRuntime>) -> Result<Client, ClientError> {
        let (registry, config, pending) = self.into_parts();
        let mut read_models = HashMap::new();
        for resolve in pending {
            let resolved = resolve(&registry)?;
            read_models.insert(resolved.type_id, resolved.read_model);
        }
        Ok(Client::new(config, registry, runtime, read_models, Vec::new()))
    }

    fn into_parts(self) -> (Arc<EventTypeRegistry>, SdkConfig, Vec<PendingReadModel>) {
        (Arc::new(self.registry), self.config, self.pending)
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("config", &self.config)
            .field("event_types", &self.registry.len())
            .field("read_models", &self.pending.len())
            .finish()
    }
}

/// The SDK entry point: resolved read models and the event store.
pub struct Client {
    config: SdkConfig,
    registry: Arc<EventTypeRegistry>,
    event_store: EventStore,
    read_models: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    rejected: Vec<ResolutionFailed>,
}

impl Client {
    /// Starts a [`ClientBuilder`].
    #[must_use]
    pub fn builder(config: SdkConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    fn new(
        config: SdkConfig,
        registry: Arc<EventTypeRegistry>,
        runtime: Arc<dyn EventStoreRuntime>,
        read_models: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
        rejected: Vec<ResolutionFailed>,
    ) -> Self {
        let event_store = EventStore::new(
            runtime,
            Arc::clone(&registry),
            config.execution_context(),
        );
        info!(
            endpoint = %config.runtime_endpoint(),
            tenant_id = %config.tenant_id,
            read_models = read_models.len(),
            rejected = rejected.len(),
            "client built"
        );
        Self {
            config,
            registry,
            event_store,
            read_models,
            rejected,
        }
    }

    /// The configuration the client was built with.
    #[must_use]
    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    /// The shared event type registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<EventTypeRegistry> {
        &self.registry
    }

    /// The event store, scoped to the configured tenant.
    #[must_use]
    pub fn event_store(&self) -> &EventStore {
        &self.event_store
    }

    /// The resolved projection of read model `R`, if it was registered and
    /// accepted.
    #[must_use]
    pub fn projection<R: ReadModel>(&self) -> Option<Arc<Projection<R>>> {
        self.read_model::<Projection<R>>()
    }

    /// The resolved embedding of read model `R`, if it was registered and
    /// accepted.
    #[must_use]
    pub fn embedding<R: ReadModel>(&self) -> Option<Arc<Embedding<R>>> {
        self.read_model::<Embedding<R>>()
    }

    /// Read models skipped because their declarations were rejected.
    #[must_use]
    pub fn rejected(&self) -> &[ResolutionFailed] {
        &self.rejected
    }

    fn read_model<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let read_model = self.read_models.get(&TypeId::of::<T>())?;
        Arc::clone(read_model).downcast::<T>().ok()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("event_store", &self.event_store)
            .field("read_models", &self.read_models.len())
            .field("rejected", &self.rejected)
            .finish_non_exhaustive()
    }
}
