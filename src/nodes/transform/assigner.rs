//! Variable assignment node executor.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::execution_context::ExecutionContext;
use crate::core::runtime_context::RuntimeContext;
use crate::dsl::{NodeRunResult, VariableAssignmentNodeData};
use crate::error::NodeError;
use crate::nodes::executor::NodeExecutor;
use crate::nodes::utils::parse_config;
use crate::template::resolve_value_spec;

/// Outputs an object of `name -> value`. A value that is a lone
/// `{{reference}}` keeps its type; other strings are rendered.
pub struct VariableAssignmentExecutor;

#[async_trait]
impl NodeExecutor for VariableAssignmentExecutor {
    async fn execute(
        &self,
        _node_id: &str,
        config: &Value,
        _input: &Value,
        ctx: &ExecutionContext,
        _runtime: &RuntimeContext,
    ) -> Result<NodeRunResult, NodeError> {
        let data: VariableAssignmentNodeData = parse_config("variable_assignment", config)?;
        let bindings = data.bindings();
        if bindings.is_empty() {
            return Err(NodeError::ConfigError(
                "variable_assignment needs at least one assignment".to_string(),
            ));
        }

        let mut output = Map::new();
        for assignment in bindings {
            if assignment.name.trim().is_empty() {
                return Err(NodeError::ConfigError("assignment name must not be empty".to_string()));
            }
            output.insert(assignment.name, resolve_value_spec(&assignment.value, ctx));
        }
        Ok(NodeRunResult::output(Value::Object(output)))
    }
}
