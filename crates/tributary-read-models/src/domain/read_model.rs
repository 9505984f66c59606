//! The trait read models implement to declare their handlers.

use super::method::MethodDeclaration;

/// A projection or embedding read model.
///
/// The default value is the state handed to handlers when no state exists
/// for a key yet.
///
/// ```ignore
/// impl ReadModel for Roster {
///     fn methods() -> Vec<MethodDeclaration<Self>> {
///         vec![
///             MethodDeclaration::handling(
///                 "On",
///                 |roster: &mut Self, event: &ShiftStarted, _: &ProjectionContext| {
///                     roster.workers.push(event.worker.clone());
///                 },
///             )
///             .with_key_selector(KeySelector::EventSourceId),
///         ]
///     }
/// }
/// ```
pub trait ReadModel: Default + Send + 'static {
    /// Declares the handler methods of the read model.
    fn methods() -> Vec<MethodDeclaration<Self>>;
}
