use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::ToolError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub recipients: Vec<String>,
}

/// Delivery channel (site inbox, email). Implementations live outside the
/// engine and are injected.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), ToolError>;
}

/// Writes notifications to the log instead of delivering them.
pub struct TracingNotificationSender {
    channel: &'static str,
}

impl TracingNotificationSender {
    pub fn new(channel: &'static str) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl NotificationSender for TracingNotificationSender {
    async fn send(&self, notification: Notification) -> Result<(), ToolError> {
        info!(
            channel = self.channel,
            title = %notification.title,
            recipients = ?notification.recipients,
            "notification"
        );
        Ok(())
    }
}

/// Keeps every notification in memory; optionally fails every send.
#[derive(Default)]
pub struct RecordingNotificationSender {
    sent: Mutex<Vec<Notification>>,
    fail_with: Option<String>,
}

impl RecordingNotificationSender {
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_with: Some(message.into()),
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl NotificationSender for RecordingNotificationSender {
    async fn send(&self, notification: Notification) -> Result<(), ToolError> {
        if let Some(message) = &self.fail_with {
            return Err(ToolError::Failed(message.clone()));
        }
        self.sent.lock().push(notification);
        Ok(())
    }
}

/// Render structured data as readable text: objects as `key: value` lines,
/// arrays of objects as a Markdown table (columns in first-appearance
/// order), other arrays as a bullet list.
pub fn render_content(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{}: {}", k, inline(v)))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => table(items),
        Value::Array(items) => items
            .iter()
            .map(|v| format!("- {}", inline(v)))
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

fn inline(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn table(rows: &[Value]) -> String {
    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        if let Value::Object(map) = row {
            for key in map.keys() {
                if !columns.contains(&key.as_str()) {
                    columns.push(key);
                }
            }
        }
    }

    let mut lines = vec![
        format!("| {} |", columns.join(" | ")),
        format!("|{}", " --- |".repeat(columns.len())),
    ];
    for row in rows {
        let cells: Vec<String> = columns
            .iter()
            .map(|c| inline(row.get(*c).unwrap_or(&Value::Null)).replace('|', "\\|"))
            .collect();
        lines.push(format!("| {} |", cells.join(" | ")));
    }
    lines.join("\n")
}
