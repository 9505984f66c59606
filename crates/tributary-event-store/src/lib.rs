//! Tributary Event Store: commits and fetches events through the Runtime.
//!
//! The [`event_store::EventStore`] facade turns typed events into
//! uncommitted sequences, threads the execution context into every request
//! and maps Runtime failures to [`error::EventStoreError`]. It never retries.

pub mod error;
pub mod event_store;
