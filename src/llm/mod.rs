//! Language-model interface consumed by the `llm`, `agent` and
//! `question_classifier` nodes.
//!
//! The engine never picks a provider: a resolved [`LanguageModel`] is
//! injected through the runtime context.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

pub mod error;
pub mod executor;
pub mod provider;
pub mod question_classifier;
pub mod types;

pub use error::LlmError;
pub use executor::LlmNodeExecutor;
pub use provider::{OpenAiCompatibleModel, OpenAiConfig};
pub use question_classifier::QuestionClassifierExecutor;
pub use types::{ChatMessage, ChatRole, GenerateRequest, GenerateResponse, ToolCall, ToolDefinition, Usage};

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, LlmError>;
}

/// Parse a model reply as JSON, tolerating Markdown code fences and
/// surrounding prose, and check the schema's `required` keys.
pub fn parse_structured_output(text: &str, schema: &Value) -> Result<Value, LlmError> {
    let body = strip_code_fence(text);
    let parsed: Value = serde_json::from_str(body)
        .or_else(|_| {
            let start = body.find(|c: char| c == '{' || c == '[').ok_or(())?;
            let end = body.rfind(|c: char| c == '}' || c == ']').ok_or(())?;
            if end < start {
                return Err(());
            }
            serde_json::from_str(&body[start..=end]).map_err(|_| ())
        })
        .map_err(|_| LlmError::InvalidOutput(format!("reply is not JSON: {}", truncate(text, 200))))?;

    if let Some(required) = schema.get("required").and_then(|v| v.as_array()) {
        let missing: Vec<&str> = required
            .iter()
            .filter_map(|k| k.as_str())
            .filter(|k| parsed.get(*k).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(LlmError::InvalidOutput(format!(
                "reply is missing required keys: {}",
                missing.join(", ")
            )));
        }
    }
    Ok(parsed)
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}

/// Model that replays queued responses and records every request.
///
/// Once the queue is drained the last response repeats.
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<GenerateResponse, String>>>,
    last: Mutex<Option<GenerateResponse>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_responses(replies.into_iter().map(|r| Ok(GenerateResponse::text(r))))
    }

    pub fn with_responses(responses: impl IntoIterator<Item = Result<GenerateResponse, String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, LlmError> {
        self.requests.lock().push(request);
        let next = self.responses.lock().pop_front();
        match next {
            Some(Ok(response)) => {
                *self.last.lock() = Some(response.clone());
                Ok(response)
            }
            Some(Err(message)) => Err(LlmError::ApiError { status: 500, message }),
            None => self.last.lock().clone().ok_or(LlmError::NotConfigured),
        }
    }
}
