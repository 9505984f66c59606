//! Tributary Read Models: projections and embeddings.
//!
//! A read model declares its handler methods as data through
//! [`domain::read_model::ReadModel`]. The resolver validates the declarations
//! against the event type registry once, at startup, and the resulting
//! projection or embedding dispatches events to the handlers.

pub mod application;
pub mod domain;
