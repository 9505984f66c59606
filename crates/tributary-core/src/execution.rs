//! The execution context threaded into every Runtime request.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of the microservice issuing requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MicroserviceId(pub Uuid);

/// Identity of the tenant whose event log is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub Uuid);

impl TenantId {
    /// The tenant used in local development setups.
    pub const DEVELOPMENT: Self = Self(Uuid::from_u128(0x445f_8ea8_1a6f_40d7_b2fc_796d_ba92_dc44));
}

impl Default for TenantId {
    fn default() -> Self {
        Self::DEVELOPMENT
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Who is running a request, where, and as part of which operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// The microservice issuing the request.
    pub microservice_id: MicroserviceId,
    /// The tenant the request is scoped to.
    pub tenant_id: TenantId,
    /// Version of the microservice.
    pub version: String,
    /// Deployment environment name.
    pub environment: String,
    /// Correlation ID for tracing a request through the system.
    pub correlation_id: Uuid,
}

impl ExecutionContext {
    /// Returns a copy scoped to `tenant_id`.
    #[must_use]
    pub fn for_tenant(&self, tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            ..self.clone()
        }
    }

    /// Returns a copy carrying `correlation_id`.
    #[must_use]
    pub fn with_correlation(&self, correlation_id: Uuid) -> Self {
        Self {
            correlation_id,
            ..self.clone()
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            microservice_id: MicroserviceId::default(),
            tenant_id: TenantId::DEVELOPMENT,
            version: "0.0.0".to_owned(),
            environment: "Development".to_owned(),
            correlation_id: Uuid::nil(),
        }
    }
}
