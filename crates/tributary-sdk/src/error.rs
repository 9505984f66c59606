//! Errors raised while composing a client.

use thiserror::Error;
use tributary_core::error::RegistryError;
use tributary_read_models::application::diagnostics::ResolutionFailed;

use crate::config::ConfigError;

/// Failures while building a [`Client`](crate::client::Client).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The configuration could not be read.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An event type association was refused.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A read model was rejected while building strictly.
    #[error(transparent)]
    ReadModelRejected(#[from] ResolutionFailed),
}
