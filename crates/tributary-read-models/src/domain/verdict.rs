//! Outcomes of dispatching an event to a read model.

use thiserror::Error;
use tributary_core::event::EventType;

use super::ids::ProjectionKey;
use super::key_selector::KeySelectionError;
use super::method::{HandlerError, ReturnKind};

/// Explicit result a projection handler can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionResultType {
    /// Keep the state as the handler left it.
    Replace,
    /// Delete the read model instance.
    Delete,
}

/// Errors carried by a failed dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The read model has no handler for the event type.
    #[error("no handler for event type {0}")]
    NoHandlerForEventType(EventType),

    /// The payload is not of the type the handler was declared for.
    #[error("handler for {expected} was invoked with an event of type {actual}")]
    HandlerInvokedOnWrongEventType {
        /// The type the handler takes.
        expected: &'static str,
        /// The type of the dispatched payload.
        actual: &'static str,
    },

    /// The read model key could not be derived from the event.
    #[error("key selection failed: {0}")]
    KeySelection(#[from] KeySelectionError),

    /// The handler returned an error or panicked.
    #[error(transparent)]
    Handler(HandlerError),

    /// The handler returned a shape its role does not accept.
    #[error("handler returned {0}, which its role does not accept")]
    UnexpectedReturn(ReturnKind),

    /// The dispatch was cancelled before the handler completed.
    #[error("dispatch was cancelled")]
    Cancelled,
}

impl From<HandlerError> for DispatchError {
    fn from(error: HandlerError) -> Self {
        match error {
            HandlerError::WrongEventType { expected, actual } => {
                Self::HandlerInvokedOnWrongEventType { expected, actual }
            }
            other => Self::Handler(other),
        }
    }
}

/// What should happen to a read model instance after an event.
#[derive(Debug)]
pub enum Verdict<R> {
    /// Store the new state.
    Replace(R),
    /// Delete the instance.
    Delete,
    /// Handling failed; the stored state is unchanged.
    Fail(DispatchError),
}

impl<R> Verdict<R> {
    /// Returns `true` for [`Verdict::Fail`].
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Fail(_))
    }
}

/// A verdict together with the key of the instance it applies to.
///
/// `key` is `None` when dispatch failed before a key was derived.
#[derive(Debug)]
pub struct Dispatched<R> {
    /// Key of the read model instance.
    pub key: Option<ProjectionKey>,
    /// The verdict.
    pub verdict: Verdict<R>,
}

impl<R> Dispatched<R> {
    pub(crate) fn failed(key: Option<ProjectionKey>, error: DispatchError) -> Self {
        Self {
            key,
            verdict: Verdict::Fail(error),
        }
    }
}
