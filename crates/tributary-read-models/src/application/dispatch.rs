//! Invocation of resolved handlers and normalization of their results.

use std::sync::Arc;

use tributary_core::cancellation::CancellationToken;

use crate::domain::context::ProjectionContext;
use crate::domain::ids::ProjectionKey;
use crate::domain::method::{EventFn, HandlerError, HandlerFuture, Returned, panic_message};
use crate::domain::projected_event::ProjectedEvent;
use crate::domain::read_model::ReadModel;
use crate::domain::verdict::{DispatchError, ProjectionResultType, Verdict};

/// Runs a handler future to completion on its own task.
///
/// Handler errors and panics are returned as errors. If `cancellation` fires
/// first the task is aborted.
pub(crate) async fn invoke<T>(
    future: HandlerFuture<T>,
    cancellation: &CancellationToken,
) -> Result<T, DispatchError>
where
    T: Send + 'static,
{
    if cancellation.is_cancelled() {
        return Err(DispatchError::Cancelled);
    }

    let mut task = tokio::spawn(future);
    tokio::select! {
        joined = &mut task => match joined {
            Ok(result) => result.map_err(DispatchError::from),
            Err(error) if error.is_panic() => Err(DispatchError::Handler(
                HandlerError::Panicked(panic_message(error.into_panic())),
            )),
            Err(_) => Err(DispatchError::Cancelled),
        },
        () = cancellation.cancelled() => {
            task.abort();
            Err(DispatchError::Cancelled)
        }
    }
}

/// Applies an `On` handler to `state` and turns its result into a verdict.
///
/// `None` state is replaced by the read model's default.
pub(crate) async fn apply_event<R: ReadModel>(
    handle: &Arc<EventFn<R>>,
    state: Option<R>,
    event: &ProjectedEvent,
    key: ProjectionKey,
    cancellation: &CancellationToken,
) -> Verdict<R> {
    let context = ProjectionContext {
        key,
        was_created_from_initial_state: state.is_none(),
        event: event.context.clone(),
        cancellation: cancellation.clone(),
    };
    let future = handle(state.unwrap_or_default(), event.payload.clone(), context);

    match invoke(future, cancellation).await {
        Ok((state, Returned::Void | Returned::ResultType(ProjectionResultType::Replace))) => {
            Verdict::Replace(state)
        }
        Ok((_, Returned::ResultType(ProjectionResultType::Delete))) => Verdict::Delete,
        Ok((_, returned)) => Verdict::Fail(DispatchError::UnexpectedReturn(returned.kind())),
        Err(error) => Verdict::Fail(error),
    }
}
