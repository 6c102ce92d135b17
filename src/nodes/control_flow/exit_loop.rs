use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::execution_context::ExecutionContext;
use crate::core::runtime_context::RuntimeContext;
use crate::dsl::NodeRunResult;
use crate::error::NodeError;
use crate::nodes::executor::NodeExecutor;

/// Marks its result as an exit signal. The owning loop reacts to it; the node
/// itself stops nothing.
pub struct ExitLoopNodeExecutor;

#[async_trait]
impl NodeExecutor for ExitLoopNodeExecutor {
    async fn execute(
        &self,
        _node_id: &str,
        _config: &Value,
        _input: &Value,
        _ctx: &ExecutionContext,
        _runtime: &RuntimeContext,
    ) -> Result<NodeRunResult, NodeError> {
        Ok(NodeRunResult::output(json!({ "exit": true })))
    }
}
