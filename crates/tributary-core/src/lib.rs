//! Tributary Core: event identities, the event type registry and the
//! invariant-checked event sequences exchanged with the Runtime.
//!
//! This crate contains no transport code. The Runtime is reached through the
//! [`runtime::EventStoreRuntime`] trait, implemented outside the SDK core.

pub mod cancellation;
pub mod clock;
pub mod error;
pub mod event;
pub mod execution;
pub mod identity;
pub mod registry;
pub mod runtime;
pub mod sequence;
