//! One executor per node type, plus the registry the dispatcher looks them
//! up in.

pub mod agent;
pub mod control_flow;
pub mod executor;
pub mod flow;
pub mod notification;
pub mod transform;
pub mod utils;

pub use executor::{NodeExecutor, NodeExecutorRegistry};
