use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::builtin::NotificationTool;
use super::notification::NotificationSender;
use super::{Tool, ToolError};
use crate::llm::ToolDefinition;

/// Tools keyed by stable id.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the two notification tools bound to `site` and `email`.
    pub fn with_notification_senders(site: Arc<dyn NotificationSender>, email: Arc<dyn NotificationSender>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(NotificationTool::site(site)));
        registry.register(Arc::new(NotificationTool::email(email)));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Definitions for the ids in `allowed`, in that order. Unknown ids are
    /// dropped; nothing outside the list is exposed.
    pub fn definitions(&self, allowed: &[String]) -> Vec<ToolDefinition> {
        allowed
            .iter()
            .filter_map(|id| self.tools.get(id))
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.input_schema(),
            })
            .collect()
    }

    pub async fn execute(&self, name: &str, input: Value) -> Result<Value, ToolError> {
        let tool = self.get(name).ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        let timeout = Duration::from_secs(tool.timeout_secs());
        debug!(tool = name, "tool call");
        match tokio::time::timeout(timeout, tool.execute(input)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                tool: name.to_string(),
                timeout_secs: tool.timeout_secs(),
            }),
        }
    }
}
