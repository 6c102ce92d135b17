use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::core::execution_context::ExecutionContext;
use crate::core::runtime_context::RuntimeContext;
use crate::dsl::{LlmNodeData, NodeRunResult};
use crate::error::NodeError;
use crate::nodes::executor::NodeExecutor;
use crate::nodes::utils::{parse_config, render_or_input};
use crate::template::render_template;

use super::parse_structured_output;
use super::types::GenerateRequest;

/// Executor for `llm` / `process` nodes: one model call with a templated
/// prompt. With an `outputSchema` the reply is parsed as JSON and checked.
pub struct LlmNodeExecutor;

#[async_trait]
impl NodeExecutor for LlmNodeExecutor {
    async fn execute(
        &self,
        node_id: &str,
        config: &Value,
        input: &Value,
        ctx: &ExecutionContext,
        runtime: &RuntimeContext,
    ) -> Result<NodeRunResult, NodeError> {
        let data: LlmNodeData = parse_config("llm", config)?;
        let model = runtime.model()?;

        let prompt = render_or_input(data.prompt.as_deref(), input, ctx);
        let system = data.system_prompt.as_deref().map(|s| render_template(s, ctx));
        let mut request = GenerateRequest::new(prompt)
            .with_system(system)
            .with_model(data.model.clone());
        request.temperature = data.temperature;
        request.max_tokens = data.max_tokens;
        request.response_schema = data.output_schema.clone();

        let response = model.generate(request).await?;
        if let Some(usage) = &response.usage {
            debug!(node_id, total_tokens = usage.total_tokens, "llm call finished");
        }

        let output = match &data.output_schema {
            Some(schema) => parse_structured_output(&response.text, schema)?,
            None => Value::String(response.text),
        };
        Ok(NodeRunResult::output(output))
    }
}
