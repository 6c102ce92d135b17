//! Built-in tools addressable by stable id from an agent's tool allowlist.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::notification::{render_content, Notification, NotificationSender};
use super::{Tool, ToolError};

pub const LOG_RETRIEVAL: &str = "log_retrieval";
pub const SITE_NOTIFICATION: &str = "site_notification";
pub const EMAIL_NOTIFICATION: &str = "email_notification";
pub const KNOWLEDGE_SEARCH: &str = "knowledge_search";

/// Sends a notification through one channel.
pub struct NotificationTool {
    id: &'static str,
    description: &'static str,
    sender: Arc<dyn NotificationSender>,
}

impl NotificationTool {
    pub fn site(sender: Arc<dyn NotificationSender>) -> Self {
        Self {
            id: SITE_NOTIFICATION,
            description: "Post a notification to the site inbox.",
            sender,
        }
    }

    pub fn email(sender: Arc<dyn NotificationSender>) -> Self {
        Self {
            id: EMAIL_NOTIFICATION,
            description: "Send a notification by email.",
            sender,
        }
    }
}

#[async_trait]
impl Tool for NotificationTool {
    fn name(&self) -> &str {
        self.id
    }

    fn description(&self) -> &str {
        self.description
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "content": {"description": "Text or structured data to render"},
                "recipients": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["title", "content"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let title = input
            .get("title")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidInput("'title' is required".into()))?
            .to_string();
        let content = render_content(input.get("content").unwrap_or(&Value::Null));
        let recipients = input
            .get("recipients")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|r| r.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        self.sender
            .send(Notification {
                title: title.clone(),
                content,
                recipients,
            })
            .await?;
        Ok(json!({ "sent": true, "channel": self.id, "title": title }))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub title: String,
    pub content: String,
}

/// Keyword search over a fixed document set. Documents are ranked by the
/// number of query terms they contain; ties keep insertion order.
pub struct KnowledgeSearchTool {
    documents: Vec<KnowledgeDocument>,
}

impl KnowledgeSearchTool {
    pub fn new(documents: Vec<KnowledgeDocument>) -> Self {
        Self { documents }
    }

    fn score(doc: &KnowledgeDocument, terms: &[String]) -> usize {
        let haystack = format!("{} {}", doc.title, doc.content).to_lowercase();
        terms.iter().filter(|t| haystack.contains(t.as_str())).count()
    }
}

#[async_trait]
impl Tool for KnowledgeSearchTool {
    fn name(&self) -> &str {
        KNOWLEDGE_SEARCH
    }

    fn description(&self) -> &str {
        "Search the knowledge base for documents matching a query."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "limit": {"type": "integer", "minimum": 1}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let query = input
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidInput("'query' is required".into()))?;
        let limit = input.get("limit").and_then(|v| v.as_u64()).unwrap_or(3) as usize;
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        let mut ranked: Vec<(usize, &KnowledgeDocument)> = self
            .documents
            .iter()
            .map(|d| (Self::score(d, &terms), d))
            .filter(|(score, _)| *score > 0)
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0));

        let results: Vec<Value> = ranked
            .into_iter()
            .take(limit)
            .map(|(score, d)| json!({ "title": d.title, "content": d.content, "score": score }))
            .collect();
        Ok(json!({ "results": results }))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub message: String,
}

/// Filters a fixed set of log entries by level and substring, newest last.
pub struct LogRetrievalTool {
    entries: Vec<LogEntry>,
}

impl LogRetrievalTool {
    pub fn new(entries: Vec<LogEntry>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl Tool for LogRetrievalTool {
    fn name(&self) -> &str {
        LOG_RETRIEVAL
    }

    fn description(&self) -> &str {
        "Retrieve recent log entries, optionally filtered by level and text."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "level": {"type": "string"},
                "query": {"type": "string"},
                "limit": {"type": "integer", "minimum": 1}
            }
        })
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let level = input.get("level").and_then(|v| v.as_str()).map(str::to_lowercase);
        let query = input.get("query").and_then(|v| v.as_str()).map(str::to_lowercase);
        let limit = input.get("limit").and_then(|v| v.as_u64()).unwrap_or(20) as usize;

        let matched: Vec<&LogEntry> = self
            .entries
            .iter()
            .filter(|e| level.as_deref().map_or(true, |l| e.level.to_lowercase() == l))
            .filter(|e| query.as_deref().map_or(true, |q| e.message.to_lowercase().contains(q)))
            .collect();
        let skip = matched.len().saturating_sub(limit);
        let entries: Vec<&LogEntry> = matched.into_iter().skip(skip).collect();
        serde_json::to_value(json!({ "entries": entries })).map_err(|e| ToolError::Failed(e.to_string()))
    }
}
