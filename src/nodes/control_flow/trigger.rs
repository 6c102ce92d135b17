use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::core::execution_context::ExecutionContext;
use crate::core::runtime_context::RuntimeContext;
use crate::dsl::NodeRunResult;
use crate::error::NodeError;
use crate::nodes::executor::NodeExecutor;

/// `start`, `webhook` and `cron_trigger`: pass the trigger payload through.
/// A scheduled trigger also stamps `triggeredAt` (RFC 3339, UTC).
pub struct TriggerNodeExecutor {
    stamp_time: bool,
}

impl TriggerNodeExecutor {
    pub fn passthrough() -> Self {
        Self { stamp_time: false }
    }

    pub fn scheduled() -> Self {
        Self { stamp_time: true }
    }
}

#[async_trait]
impl NodeExecutor for TriggerNodeExecutor {
    async fn execute(
        &self,
        _node_id: &str,
        _config: &Value,
        input: &Value,
        _ctx: &ExecutionContext,
        runtime: &RuntimeContext,
    ) -> Result<NodeRunResult, NodeError> {
        if !self.stamp_time {
            return Ok(NodeRunResult::output(input.clone()));
        }

        let stamp = DateTime::<Utc>::from_timestamp_millis(runtime.time_provider.now_millis())
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        let output = match input {
            Value::Object(map) => {
                let mut map = map.clone();
                map.insert("triggeredAt".to_string(), Value::String(stamp));
                Value::Object(map)
            }
            Value::Null => json!({ "triggeredAt": stamp }),
            other => json!({ "payload": other, "triggeredAt": stamp }),
        };
        Ok(NodeRunResult::output(output))
    }
}
