//! Problems found while resolving a read model's declarations.

use thiserror::Error;
use tracing::warn;
use tributary_core::event::EventType;

use crate::domain::method::{ReturnShape, Role};

/// One problem with a read model's declarations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Diagnostic {
    /// More than one method was found for a singular role.
    #[error("more than one {role} method: {}", .methods.join(", "))]
    AmbiguousMethod {
        /// The role.
        role: Role,
        /// Names of the candidate methods.
        methods: Vec<String>,
    },

    /// The method's parameters do not match its role.
    #[error("method '{method}' cannot be {role}: expected ({expected}), found ({found})")]
    InvalidSignature {
        /// The method name.
        method: String,
        /// The role.
        role: Role,
        /// The parameters the role takes.
        expected: String,
        /// The parameters the method takes.
        found: String,
    },

    /// The method's return shape is not accepted for its role.
    #[error("method '{method}' cannot be {role}: it returns {found}")]
    InvalidReturnType {
        /// The method name.
        method: String,
        /// The role.
        role: Role,
        /// The declared return shape.
        found: ReturnShape,
    },

    /// The event type an `On` method handles cannot be determined.
    #[error("cannot resolve the event type handled by '{method}': {reason}")]
    UnresolvableEventType {
        /// The method name.
        method: String,
        /// Why resolution failed.
        reason: String,
    },

    /// The decoration names a different event type than the registry.
    #[error(
        "method '{method}' is decorated for {declared} but its event is associated with {associated}"
    )]
    MismatchedEventType {
        /// The method name.
        method: String,
        /// The event type on the decoration.
        declared: EventType,
        /// The event type in the registry.
        associated: EventType,
    },

    /// An `On` method has the wrong number of key selectors.
    #[error("method '{method}' needs {expected} key selector(s), found {found}")]
    InvalidOrMissingKeySelector {
        /// The method name.
        method: String,
        /// The number of key selectors required.
        expected: usize,
        /// The number declared.
        found: usize,
    },

    /// Two methods handle the same event type.
    #[error("method '{method}' handles {event_type}, already handled by '{existing}'")]
    DuplicateEventTypeHandler {
        /// The rejected method.
        method: String,
        /// The event type.
        event_type: EventType,
        /// The method already handling it.
        existing: String,
    },

    /// A decorated method plays a role the read model kind does not have.
    #[error("method '{method}' is decorated as {role}, which projections do not support")]
    UnsupportedRole {
        /// The method name.
        method: String,
        /// The role.
        role: Role,
    },

    /// A required role has no method.
    #[error("no {role} method is declared")]
    MissingMethod {
        /// The role.
        role: Role,
    },

    /// The read model handles no events.
    #[error("no On methods are declared")]
    NoHandlers,
}

/// A read model rejected during resolution, with everything found wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("read model {read_model} was rejected with {} diagnostic(s)", .diagnostics.len())]
pub struct ResolutionFailed {
    /// Rust name of the read model type.
    pub read_model: &'static str,
    /// The diagnostics, in the order they were found.
    pub diagnostics: Vec<Diagnostic>,
}

impl ResolutionFailed {
    pub(crate) fn new(read_model: &'static str, diagnostics: Vec<Diagnostic>) -> Self {
        for diagnostic in &diagnostics {
            warn!(read_model, %diagnostic, "read model declaration rejected");
        }
        Self {
            read_model,
            diagnostics,
        }
    }
}
