//! Tributary SDK: the composition root for applications.
//!
//! [`config::SdkConfig`] describes where the Runtime lives and who the
//! microservice is. [`client::ClientBuilder`] associates event types, resolves
//! projections and embeddings against the shared registry and wires the
//! [`tributary_event_store::event_store::EventStore`] to a Runtime.

pub mod client;
pub mod config;
pub mod error;
