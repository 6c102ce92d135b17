//! Container node executors: Iteration and Loop.
//!
//! Both own a private sub-graph that is executed once per item / pass via
//! the runtime's [`SubGraphRunner`](crate::core::SubGraphRunner), each time
//! with a fresh execution context.

pub mod iteration;
pub mod loop_node;

pub use iteration::IterationNodeExecutor;
pub use loop_node::LoopNodeExecutor;
