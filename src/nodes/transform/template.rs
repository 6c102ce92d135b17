//! Template node executor.

use async_trait::async_trait;
use serde_json::Value;

use crate::core::execution_context::ExecutionContext;
use crate::core::runtime_context::RuntimeContext;
use crate::dsl::{NodeRunResult, TemplateNodeData};
use crate::error::NodeError;
use crate::nodes::executor::NodeExecutor;
use crate::nodes::utils::parse_config;
use crate::template::render_template;

/// Renders `{{...}}` references into a string. Missing references render
/// as empty text.
pub struct TemplateNodeExecutor;

#[async_trait]
impl NodeExecutor for TemplateNodeExecutor {
    async fn execute(
        &self,
        _node_id: &str,
        config: &Value,
        _input: &Value,
        ctx: &ExecutionContext,
        _runtime: &RuntimeContext,
    ) -> Result<NodeRunResult, NodeError> {
        let data: TemplateNodeData = parse_config("template", config)?;
        Ok(NodeRunResult::output(Value::String(render_template(&data.template, ctx))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_render_with_gaps() {
        let ctx = ExecutionContext::new(json!({"items": ["a", "b"], "n": 2}));
        let config = json!({"template": "{{input.n}} items, first {{input.items.0}}{{nope.x}}"});
        let result = TemplateNodeExecutor
            .execute("t", &config, &Value::Null, &ctx, &RuntimeContext::default())
            .await
            .unwrap();
        assert_eq!(result.output, json!("2 items, first a"));
    }
}
