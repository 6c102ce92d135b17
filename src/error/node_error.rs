use thiserror::Error;

use super::error_context::{ErrorCode, ErrorContext};

/// Node-level errors
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Execution error: {0}")]
    ExecutionError(String),
    #[error("Template error: {0}")]
    TemplateError(String),
    #[error("Input validation error: {0}")]
    InputValidationError(String),
    #[error("Timeout: node execution exceeded {0}ms")]
    Timeout(u64),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("HTTP error: {0}")]
    HttpError(String),
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("Sandbox error: {0}")]
    SandboxError(String),
    #[error("Model error: {0}")]
    LlmError(String),
    #[error("Tool error: {0}")]
    ToolError(String),
    #[error("Cancelled")]
    Cancelled,
}

impl NodeError {
    /// Classify the error for retry and reporting decisions.
    pub fn error_context(&self) -> ErrorContext {
        let msg = self.to_string();
        match self {
            NodeError::ConfigError(_) => ErrorContext::non_retryable(ErrorCode::ConfigError, msg),
            NodeError::TemplateError(_) => ErrorContext::non_retryable(ErrorCode::TemplateError, msg),
            NodeError::InputValidationError(_) => {
                ErrorContext::non_retryable(ErrorCode::InputValidationError, msg)
            }
            NodeError::SerializationError(_) => {
                ErrorContext::non_retryable(ErrorCode::SerializationError, msg)
            }
            NodeError::Timeout(_) => ErrorContext::retryable(ErrorCode::Timeout, msg),
            NodeError::HttpError(_) => ErrorContext::retryable(ErrorCode::NetworkError, msg),
            NodeError::HttpStatus { status, .. } => {
                let ctx = if *status >= 500 || *status == 429 {
                    ErrorContext::retryable(ErrorCode::HttpServerError, msg)
                } else {
                    ErrorContext::non_retryable(ErrorCode::HttpClientError, msg)
                };
                ctx.with_http_status(*status)
            }
            NodeError::SandboxError(_) => {
                ErrorContext::retryable(ErrorCode::SandboxExecutionError, msg)
            }
            NodeError::LlmError(_) => ErrorContext::retryable(ErrorCode::LlmApiError, msg),
            NodeError::ToolError(_) => ErrorContext::retryable(ErrorCode::ToolError, msg),
            NodeError::ExecutionError(_) => ErrorContext::retryable(ErrorCode::InternalError, msg),
            NodeError::Cancelled => ErrorContext::fatal(ErrorCode::Cancelled, msg),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.error_context().is_retryable()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, NodeError::Cancelled)
    }
}

impl From<serde_json::Error> for NodeError {
    fn from(e: serde_json::Error) -> Self {
        NodeError::SerializationError(e.to_string())
    }
}

impl From<aiflow_types::SandboxError> for NodeError {
    fn from(e: aiflow_types::SandboxError) -> Self {
        match e {
            aiflow_types::SandboxError::ExecutionTimeout(d) => NodeError::Timeout(d.as_millis() as u64),
            aiflow_types::SandboxError::Cancelled => NodeError::Cancelled,
            other => NodeError::SandboxError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_http_status_retryability() {
        let server = NodeError::HttpStatus { status: 503, body: "down".into() };
        let client = NodeError::HttpStatus { status: 404, body: "missing".into() };
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
        assert_eq!(client.error_context().http_status, Some(404));
        assert_eq!(client.to_string(), "HTTP 404: missing");
    }

    #[test]
    fn test_sandbox_timeout_maps_to_timeout() {
        let err: NodeError = aiflow_types::SandboxError::ExecutionTimeout(Duration::from_secs(5)).into();
        assert!(matches!(err, NodeError::Timeout(5000)));
        assert!(err.to_string().contains("5000ms"));
    }

    #[test]
    fn test_config_errors_are_not_retried() {
        assert!(!NodeError::ConfigError("x".into()).is_retryable());
        assert!(!NodeError::Cancelled.is_retryable());
    }
}
