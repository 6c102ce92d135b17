//! Tools exposed to agent nodes and the notification channels shared with
//! the `notification` node.

pub mod builtin;
pub mod notification;
pub mod registry;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::error::NodeError;

pub use builtin::{
    KnowledgeDocument, KnowledgeSearchTool, LogEntry, LogRetrievalTool, NotificationTool, EMAIL_NOTIFICATION,
    KNOWLEDGE_SEARCH, LOG_RETRIEVAL, SITE_NOTIFICATION,
};
pub use notification::{
    render_content, Notification, NotificationSender, RecordingNotificationSender, TracingNotificationSender,
};
pub use registry::ToolRegistry;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),
    #[error("Tool '{tool}' timed out after {timeout_secs}s")]
    Timeout { tool: String, timeout_secs: u64 },
    #[error("Invalid tool input: {0}")]
    InvalidInput(String),
    #[error("Tool failed: {0}")]
    Failed(String),
}

impl From<ToolError> for NodeError {
    fn from(e: ToolError) -> Self {
        NodeError::ToolError(e.to_string())
    }
}

/// A capability the model may call by its stable id.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the input object.
    fn input_schema(&self) -> Value;

    async fn execute(&self, input: Value) -> Result<Value, ToolError>;

    fn timeout_secs(&self) -> u64 {
        30
    }
}
