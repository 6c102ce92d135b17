//! Code node executor (sandbox-backed execution).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::core::execution_context::ExecutionContext;
use crate::core::runtime_context::RuntimeContext;
use crate::dsl::{CodeNodeData, NodeRunResult};
use crate::error::NodeError;
use crate::nodes::executor::NodeExecutor;
use crate::nodes::utils::parse_config;
use crate::sandbox::{CodeLanguage, SandboxRequest};
use crate::template::resolve_value_spec;

/// Runs user code through the runtime's sandbox manager. The value returned
/// by `main` becomes the node output.
pub struct CodeNodeExecutor;

#[async_trait]
impl NodeExecutor for CodeNodeExecutor {
    async fn execute(
        &self,
        node_id: &str,
        config: &Value,
        input: &Value,
        ctx: &ExecutionContext,
        runtime: &RuntimeContext,
    ) -> Result<NodeRunResult, NodeError> {
        let data: CodeNodeData = parse_config("code", config)?;
        if data.code.trim().is_empty() {
            return Err(NodeError::ConfigError("code node has no code".to_string()));
        }

        let vars: Map<String, Value> = data
            .variables
            .iter()
            .map(|(name, spec)| (name.clone(), resolve_value_spec(spec, ctx)))
            .collect();
        let timeout_ms = data.timeout.unwrap_or(match data.language {
            CodeLanguage::JavaScript => runtime.config.js_timeout_ms,
            CodeLanguage::Python => runtime.config.python_timeout_ms,
        });

        let request = SandboxRequest::new(data.code, data.language, input.clone(), Value::Object(vars))
            .with_timeout(Duration::from_millis(timeout_ms));
        let result = runtime.sandbox.execute(request).await?;
        debug!(
            node_id,
            language = %data.language,
            elapsed_ms = result.execution_time.as_millis() as u64,
            stdout = %result.stdout,
            "code node finished"
        );
        Ok(NodeRunResult::output(result.output))
    }
}
