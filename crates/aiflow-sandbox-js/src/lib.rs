pub mod builtins;
pub mod expression;
mod runtime;
pub mod sandbox;

pub use expression::ExpressionEvaluator;
pub use sandbox::{JsSandbox, JsSandboxConfig};
