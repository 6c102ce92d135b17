//! Condition-node evaluation.

pub mod condition;
pub mod operators;

pub use condition::{evaluate_condition, evaluate_conditions};
pub use operators::compare;
