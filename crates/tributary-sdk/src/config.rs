//! Environment-driven SDK configuration.

use thiserror::Error;
use tributary_core::execution::{ExecutionContext, MicroserviceId, TenantId};
use uuid::Uuid;

const HOST: &str = "TRIBUTARY_RUNTIME_HOST";
const PORT: &str = "TRIBUTARY_RUNTIME_PORT";
const MICROSERVICE_ID: &str = "TRIBUTARY_MICROSERVICE_ID";
const TENANT_ID: &str = "TRIBUTARY_TENANT_ID";
const ENVIRONMENT: &str = "TRIBUTARY_ENVIRONMENT";
const VERSION: &str = "TRIBUTARY_VERSION";

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The port is not a valid `u16`.
    #[error("TRIBUTARY_RUNTIME_PORT must be a valid u16, got {value:?}: {source}")]
    InvalidPort {
        /// The configured value.
        value: String,
        /// The parse failure.
        #[source]
        source: std::num::ParseIntError,
    },

    /// An identifier is not a valid UUID.
    #[error("{key} must be a valid UUID, got {value:?}: {source}")]
    InvalidUuid {
        /// The variable that was read.
        key: &'static str,
        /// The configured value.
        value: String,
        /// The parse failure.
        #[source]
        source: uuid::Error,
    },
}

/// Where the Runtime lives and who this microservice is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkConfig {
    /// Runtime host name.
    pub runtime_host: String,
    /// Runtime port.
    pub runtime_port: u16,
    /// The microservice issuing requests.
    pub microservice_id: MicroserviceId,
    /// The tenant requests are scoped to unless overridden.
    pub tenant_id: TenantId,
    /// Deployment environment name.
    pub environment: String,
    /// Version of the microservice.
    pub version: String,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            runtime_host: "localhost".to_owned(),
            runtime_port: 50053,
            microservice_id: MicroserviceId::default(),
            tenant_id: TenantId::DEVELOPMENT,
            environment: "Development".to_owned(),
            version: "0.0.0".to_owned(),
        }
    }
}

impl SdkConfig {
    /// Reads the configuration from `TRIBUTARY_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the port or an identifier does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, falling back to defaults for
    /// missing keys.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the port or an identifier does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let runtime_port = match lookup(PORT) {
            Some(value) => value
                .parse()
                .map_err(|source| ConfigError::InvalidPort { value, source })?,
            None => defaults.runtime_port,
        };
        let microservice_id = match lookup(MICROSERVICE_ID) {
            Some(value) => MicroserviceId(parse_uuid(MICROSERVICE_ID, value)?),
            None => defaults.microservice_id,
        };
        let tenant_id = match lookup(TENANT_ID) {
            Some(value) => TenantId(parse_uuid(TENANT_ID, value)?),
            None => defaults.tenant_id,
        };

        Ok(Self {
            runtime_host: lookup(HOST).unwrap_or(defaults.runtime_host),
            runtime_port,
            microservice_id,
            tenant_id,
            environment: lookup(ENVIRONMENT).unwrap_or(defaults.environment),
            version: lookup(VERSION).unwrap_or(defaults.version),
        })
    }

    /// The Runtime address, as `http://host:port`.
    #[must_use]
    pub fn runtime_endpoint(&self) -> String {
        format!("http://{}:{}", self.runtime_host, self.runtime_port)
    }

    /// Builds an execution context for this microservice with a fresh
    /// correlation id.
    #[must_use]
    pub fn execution_context(&self) -> ExecutionContext {
        ExecutionContext {
            microservice_id: self.microservice_id,
            tenant_id: self.tenant_id,
            version: self.version.clone(),
            environment: self.environment.clone(),
            correlation_id: Uuid::new_v4(),
        }
    }
}

fn parse_uuid(key: &'static str, value: String) -> Result<Uuid, ConfigError> {
    Uuid::parse_str(value.trim()).map_err(|source| ConfigError::InvalidUuid { key, value, source })
}
