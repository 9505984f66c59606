//! Shared test runtimes and utilities for the Tributary SDK.

mod clock;
mod runtime;

pub use clock::FixedClock;
pub use runtime::{
    FailingRuntime, InMemoryRuntime, MisdirectedRuntime, RecordedRequest, RecordingRuntime,
    StalledRuntime,
};
