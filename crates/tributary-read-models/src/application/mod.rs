//! Resolution of read model declarations and dispatch to the resolved handlers.

pub mod diagnostics;
pub mod dispatch;
pub mod embedding;
pub mod projection;
pub mod resolver;
