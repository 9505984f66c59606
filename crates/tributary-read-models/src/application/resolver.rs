//! Validation of read model declarations into dispatch tables.
//!
//! Resolution is fail-slow: every declaration is checked and all problems are
//! reported together. A read model with any diagnostic is rejected whole.

use std::any::type_name;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::debug;
use tributary_core::event::EventType;
use tributary_core::registry::EventTypeRegistry;

use super::diagnostics::{Diagnostic, ResolutionFailed};
use crate::domain::key_selector::KeySelector;
use crate::domain::method::{
    ContextFn, EventFn, EventParameter, MethodBody, MethodDeclaration, ParameterKind,
    ReceivedStateFn, ReturnKind, Role,
};
use crate::domain::read_model::ReadModel;

/// A resolved `On` method: the event type it handles and how to key it.
pub struct EventHandler<R, K> {
    method: String,
    event_type: EventType,
    key: K,
    pub(crate) handle: Arc<EventFn<R>>,
}

impl<R, K> EventHandler<R, K> {
    /// Name of the declaring method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The event type handled.
    #[must_use]
    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    /// The key derivation, `()` for embeddings.
    #[must_use]
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<R, K: fmt::Debug> fmt::Debug for EventHandler<R, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler")
            .field("method", &self.method)
            .field("event_type", &self.event_type)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// A resolved embedding reconciliation method.
pub(crate) struct ReconcileMethod<F: ?Sized> {
    pub(crate) method: String,
    pub(crate) handle: Arc<F>,
}

/// Which roles a read model may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadModelKind {
    Projection,
    Embedding,
}

pub(crate) struct ResolvedMethods<R, K> {
    pub(crate) handlers: HashMap<EventType, EventHandler<R, K>>,
    pub(crate) compare: Option<ReconcileMethod<ReceivedStateFn<R>>>,
    pub(crate) update: Option<ReconcileMethod<ReceivedStateFn<R>>>,
    pub(crate) delete: Option<ReconcileMethod<ContextFn<R>>>,
    pub(crate) remove: Option<ReconcileMethod<ContextFn<R>>>,
}

/// Key policy of projections: exactly one key selector per `On` method.
pub(crate) fn single_key_selector(
    method: &str,
    selectors: Vec<KeySelector>,
) -> Result<KeySelector, Diagnostic> {
    let found = selectors.len();
    let mut selectors = selectors.into_iter();
    match (selectors.next(), selectors.next()) {
        (Some(selector), None) => Ok(selector),
        _ => Err(Diagnostic::InvalidOrMissingKeySelector {
            method: method.to_owned(),
            expected: 1,
            found,
        }),
    }
}

/// Key policy of embeddings: the Runtime supplies the key.
pub(crate) fn no_key_selector(method: &str, selectors: Vec<KeySelector>) -> Result<(), Diagnostic> {
    if selectors.is_empty() {
        Ok(())
    } else {
        Err(Diagnostic::InvalidOrMissingKeySelector {
            method: method.to_owned(),
            expected: 0,
            found: selectors.len(),
        })
    }
}

/// Resolves the declarations of `R` against `registry`.
pub(crate) fn resolve<R, K>(
    kind: ReadModelKind,
    registry: &EventTypeRegistry,
    select_key: fn(&str, Vec<KeySelector>) -> Result<K, Diagnostic>,
) -> Result<ResolvedMethods<R, K>, ResolutionFailed>
where
    R: ReadModel,
{
    let read_model = type_name::<R>();
    let mut diagnostics = Vec::new();
    let mut candidates: BTreeMap<Role, Vec<MethodDeclaration<R>>> = BTreeMap::new();

    for method in R::methods() {
        match method.role() {
            Some(Role::On) => candidates.entry(Role::On).or_default().push(method),
            Some(role) if kind == ReadModelKind::Embedding => {
                candidates.entry(role).or_default().push(method);
            }
            Some(role) if method.decoration().is_some() => {
                diagnostics.push(Diagnostic::UnsupportedRole {
                    method: method.name().to_owned(),
                    role,
                });
            }
            _ => debug!(read_model, method = method.name(), "method plays no role"),
        }
    }

    let mut resolved = ResolvedMethods {
        handlers: HashMap::new(),
        compare: None,
        update: None,
        delete: None,
        remove: None,
    };

    let on_methods = candidates.remove(&Role::On).unwrap_or_default();
    if on_methods.is_empty() {
        diagnostics.push(Diagnostic::NoHandlers);
    }
    for method in on_methods {
        let Some(handler) = resolve_on(method, registry, select_key, &mut diagnostics) else {
            continue;
        };
        match resolved.handlers.entry(handler.event_type.clone()) {
            Entry::Occupied(existing) => diagnostics.push(Diagnostic::DuplicateEventTypeHandler {
                method: handler.method,
                event_type: handler.event_type,
                existing: existing.get().method.clone(),
            }),
            Entry::Vacant(slot) => {
                debug!(
                    read_model,
                    method = %handler.method,
                    event_type = %handler.event_type,
                    "resolved On method"
                );
                slot.insert(handler);
            }
        }
    }

    let update_declared = candidates.contains_key(&Role::Update);
    for (role, methods) in candidates {
        if let Some(method) = single(role, methods, &mut diagnostics) {
            resolve_reconcile(role, method, &mut resolved, &mut diagnostics);
        }
    }
    if kind == ReadModelKind::Embedding && !update_declared {
        diagnostics.push(Diagnostic::MissingMethod { role: Role::Update });
    }

    if diagnostics.is_empty() {
        Ok(resolved)
    } else {
        Err(ResolutionFailed::new(read_model, diagnostics))
    }
}

fn single<R>(
    role: Role,
    mut methods: Vec<MethodDeclaration<R>>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<MethodDeclaration<R>> {
    if methods.len() > 1 {
        diagnostics.push(Diagnostic::AmbiguousMethod {
            role,
            methods: methods.iter().map(|method| method.name().to_owned()).collect(),
        });
        return None;
    }
    methods.pop()
}

fn resolve_on<R, K>(
    method: MethodDeclaration<R>,
    registry: &EventTypeRegistry,
    select_key: fn(&str, Vec<KeySelector>) -> Result<K, Diagnostic>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<EventHandler<R, K>> {
    if !check_parameters(&method, Role::On, diagnostics) {
        return None;
    }
    let returns_valid = check_return(&method, Role::On, diagnostics);
    let event_type = resolve_event_type(&method, registry, diagnostics);
    let key = select_key(method.name(), method.key_selectors().to_vec())
        .map_err(|diagnostic| diagnostics.push(diagnostic))
        .ok();

    let (true, Some(event_type), Some(key)) = (returns_valid, event_type, key) else {
        return None;
    };
    let name = method.name().to_owned();
    match method.into_body() {
        MethodBody::Event(handle) => Some(EventHandler {
            method: name,
            event_type,
            key,
            handle,
        }),
        MethodBody::ReceivedState(_) | MethodBody::Context(_) => None,
    }
}

fn resolve_reconcile<R, K>(
    role: Role,
    method: MethodDeclaration<R>,
    resolved: &mut ResolvedMethods<R, K>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let parameters_valid = check_parameters(&method, role, diagnostics);
    let returns_valid = check_return(&method, role, diagnostics);
    if !no_key_selectors(&method, diagnostics) || !parameters_valid || !returns_valid {
        return;
    }

    let name = method.name().to_owned();
    debug!(method = %name, role = %role, "resolved reconciliation method");
    match (role, method.into_body()) {
        (Role::Compare, MethodBody::ReceivedState(handle)) => {
            resolved.compare = Some(ReconcileMethod { method: name, handle });
        }
        (Role::Update, MethodBody::ReceivedState(handle)) => {
            resolved.update = Some(ReconcileMethod { method: name, handle });
        }
        (Role::Delete, MethodBody::Context(handle)) => {
            resolved.delete = Some(ReconcileMethod { method: name, handle });
        }
        (Role::Remove, MethodBody::Context(handle)) => {
            resolved.remove = Some(ReconcileMethod { method: name, handle });
        }
        _ => {}
    }
}

fn expected_parameters(role: Role) -> &'static [ParameterKind] {
    match role {
        Role::On => &[ParameterKind::Event, ParameterKind::Context],
        Role::Compare | Role::Update => &[ParameterKind::ReceivedState, ParameterKind::Context],
        Role::Delete | Role::Remove => &[ParameterKind::Context],
    }
}

fn accepts(role: Role, kind: ReturnKind) -> bool {
    match role {
        Role::On => matches!(kind, ReturnKind::Void | ReturnKind::ResultType),
        Role::Compare | Role::Update | Role::Delete | Role::Remove => {
            matches!(kind, ReturnKind::Event | ReturnKind::Events)
        }
    }
}

fn describe(kinds: &[ParameterKind]) -> String {
    kinds
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn check_parameters<R>(
    method: &MethodDeclaration<R>,
    role: Role,
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    let found = method.signature().parameter_kinds();
    let expected = expected_parameters(role);
    if found == expected {
        return true;
    }
    diagnostics.push(Diagnostic::InvalidSignature {
        method: method.name().to_owned(),
        role,
        expected: describe(expected),
        found: describe(&found),
    });
    false
}

fn check_return<R>(
    method: &MethodDeclaration<R>,
    role: Role,
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    let returns = method.signature().returns;
    if accepts(role, returns.kind) {
        return true;
    }
    diagnostics.push(Diagnostic::InvalidReturnType {
        method: method.name().to_owned(),
        role,
        found: returns,
    });
    false
}

fn no_key_selectors<R>(method: &MethodDeclaration<R>, diagnostics: &mut Vec<Diagnostic>) -> bool {
    no_key_selector(method.name(), method.key_selectors().to_vec())
        .map_err(|diagnostic| diagnostics.push(diagnostic))
        .is_ok()
}

fn resolve_event_type<R>(
    method: &MethodDeclaration<R>,
    registry: &EventTypeRegistry,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<EventType> {
    let declared = method
        .decoration()
        .and_then(|decoration| decoration.event_type.clone());
    let unresolvable = |reason: String| Diagnostic::UnresolvableEventType {
        method: method.name().to_owned(),
        reason,
    };

    match method.signature().event_parameter() {
        Some(EventParameter::Untyped) => {
            if declared.is_none() {
                diagnostics.push(unresolvable(
                    "the event parameter is untyped and no event type is declared".to_owned(),
                ));
            }
            declared
        }
        Some(EventParameter::Typed { type_id, type_name }) => {
            let Some(associated) = registry.event_type_for_type_id(type_id) else {
                diagnostics.push(unresolvable(format!(
                    "{type_name} is not associated with an event type"
                )));
                return None;
            };
            match declared {
                Some(declared) if declared != *associated => {
                    diagnostics.push(Diagnostic::MismatchedEventType {
                        method: method.name().to_owned(),
                        declared,
                        associated: associated.clone(),
                    });
                    None
                }
                _ => Some(associated.clone()),
            }
        }
        None => {
            diagnostics.push(unresolvable("the method takes no event".to_owned()));
            None
        }
    }
}
