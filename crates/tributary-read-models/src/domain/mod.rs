//! Read model declarations: identities, contexts, key selectors, handler
//! methods and dispatch verdicts.

pub mod context;
pub mod ids;
pub mod key_selector;
pub mod method;
pub mod projected_event;
pub mod read_model;
pub mod verdict;
