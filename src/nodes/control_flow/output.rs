use async_trait::async_trait;
use serde_json::Value;

use crate::core::execution_context::ExecutionContext;
use crate::core::runtime_context::RuntimeContext;
use crate::dsl::{NodeRunResult, OutputNodeData};
use crate::error::NodeError;
use crate::nodes::executor::NodeExecutor;
use crate::nodes::utils::parse_config;
use crate::template::{render_template, resolve_reference};

/// `output` / `end`: a rendered template, else the value behind
/// `outputVariable`, else the node input.
pub struct OutputNodeExecutor;

#[async_trait]
impl NodeExecutor for OutputNodeExecutor {
    async fn execute(
        &self,
        _node_id: &str,
        config: &Value,
        input: &Value,
        ctx: &ExecutionContext,
        _runtime: &RuntimeContext,
    ) -> Result<NodeRunResult, NodeError> {
        let data: OutputNodeData = parse_config("output", config)?;

        let output = if let Some(template) = data.template.as_deref().filter(|t| !t.is_empty()) {
            Value::String(render_template(template, ctx))
        } else if let Some(reference) = data.output_variable.as_deref().filter(|r| !r.trim().is_empty()) {
            resolve_reference(reference, ctx).unwrap_or(Value::Null)
        } else {
            input.clone()
        };
        Ok(NodeRunResult::output(output))
    }
}
