use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::core::execution_context::ExecutionContext;
use crate::core::runtime_context::RuntimeContext;
use crate::dsl::{ConditionNodeData, NodeRunResult};
use crate::error::NodeError;
use crate::evaluator::evaluate_conditions;
use crate::nodes::executor::NodeExecutor;
use crate::nodes::utils::parse_config;

/// Keeps the edges whose handle is `"true"` or `"false"`, per the outcome.
pub struct ConditionNodeExecutor;

#[async_trait]
impl NodeExecutor for ConditionNodeExecutor {
    async fn execute(
        &self,
        node_id: &str,
        config: &Value,
        _input: &Value,
        ctx: &ExecutionContext,
        runtime: &RuntimeContext,
    ) -> Result<NodeRunResult, NodeError> {
        let data: ConditionNodeData = parse_config("condition", config)?;
        let outcome = evaluate_conditions(&data, ctx, &runtime.expression).await?;
        debug!(node_id, outcome, "condition evaluated");

        let handle = if outcome { "true" } else { "false" };
        Ok(NodeRunResult::branch(json!({ "result": outcome }), handle))
    }
}
