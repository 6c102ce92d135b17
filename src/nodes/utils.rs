use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::execution_context::ExecutionContext;
use crate::error::NodeError;
use crate::template::{render_template, value_to_text};

/// Deserialize a node's `data` into its typed config.
pub fn parse_config<T: DeserializeOwned>(node_type: &str, config: &Value) -> Result<T, NodeError> {
    serde_json::from_value(config.clone())
        .map_err(|e| NodeError::ConfigError(format!("Invalid {} config: {}", node_type, e)))
}

/// Render `template` when it is set and non-blank, else use the node input as
/// text.
pub fn render_or_input(template: Option<&str>, input: &Value, ctx: &ExecutionContext) -> String {
    match template.filter(|t| !t.trim().is_empty()) {
        Some(t) => render_template(t, ctx),
        None => value_to_text(Some(input)),
    }
}

/// A string that holds a JSON document is decoded; anything else is returned
/// unchanged.
pub fn decode_json_text(value: Value) -> Value {
    match &value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.starts_with('[') || trimmed.starts_with('{') {
                serde_json::from_str(trimmed).unwrap_or(value)
            } else {
                value
            }
        }
        _ => value,
    }
}
