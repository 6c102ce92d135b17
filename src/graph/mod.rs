//! Graph construction and traversal state.
//!
//! A [`Graph`] is one scope of a workflow definition: the top level, or the
//! private sub-graph of an iteration/loop node. It is immutable once built and
//! shared across runs; per-run edge state lives in [`EdgeStates`].

pub mod builder;
pub mod traversal;
pub mod types;

pub use builder::{build_graph, build_scope};
pub use traversal::EdgeStates;
pub use types::*;
