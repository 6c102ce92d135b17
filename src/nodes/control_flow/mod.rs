//! Triggers, branching and terminal nodes.

mod condition;
mod exit_loop;
mod output;
mod trigger;

pub use condition::ConditionNodeExecutor;
pub use exit_loop::ExitLoopNodeExecutor;
pub use output::OutputNodeExecutor;
pub use trigger::TriggerNodeExecutor;
