use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::core::execution_context::ExecutionContext;
use crate::core::runtime_context::RuntimeContext;
use crate::dsl::{NodeRunResult, NotificationChannel, NotificationNodeData};
use crate::error::NodeError;
use crate::nodes::executor::NodeExecutor;
use crate::nodes::utils::parse_config;
use crate::template::{render_template, resolve_value_spec};
use crate::tools::{render_content, Notification};

const DEFAULT_TITLE: &str = "Workflow notification";

/// Executor for `notification` nodes: site inbox, email or both.
pub struct NotificationNodeExecutor;

#[async_trait]
impl NodeExecutor for NotificationNodeExecutor {
    async fn execute(
        &self,
        node_id: &str,
        config: &Value,
        input: &Value,
        ctx: &ExecutionContext,
        runtime: &RuntimeContext,
    ) -> Result<NodeRunResult, NodeError> {
        let data: NotificationNodeData = parse_config("notification", config)?;

        let title = data
            .title
            .as_deref()
            .map(|t| render_template(t, ctx))
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        // A lone reference keeps its structure so tables render; anything
        // else is a text template.
        let content = match data.content.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(spec) => render_content(&resolve_value_spec(&Value::String(spec.to_string()), ctx)),
            None => render_content(input),
        };

        let notification = Notification {
            title: title.clone(),
            content: content.clone(),
            recipients: data.recipients.clone(),
        };
        let channels: &[(&str, bool)] = &[
            ("site", matches!(data.notification_type, NotificationChannel::Site | NotificationChannel::Both)),
            ("email", matches!(data.notification_type, NotificationChannel::Email | NotificationChannel::Both)),
        ];
        let mut delivered = Vec::new();
        for (channel, enabled) in channels {
            if !enabled {
                continue;
            }
            let sender = if *channel == "site" {
                &runtime.site_sender
            } else {
                &runtime.email_sender
            };
            sender.send(notification.clone()).await?;
            delivered.push(*channel);
        }
        info!(node_id, channels = ?delivered, "notification sent");

        Ok(NodeRunResult::output(json!({
            "sent": true,
            "channels": delivered,
            "title": title,
            "content": content,
        })))
    }
}
