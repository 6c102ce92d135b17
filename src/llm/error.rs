use thiserror::Error;

use crate::error::NodeError;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Model not configured")]
    NotConfigured,

    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid model output: {0}")]
    InvalidOutput(String),
}

impl From<LlmError> for NodeError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::NotConfigured | LlmError::InvalidRequest(_) | LlmError::AuthenticationError(_) => {
                NodeError::ConfigError(e.to_string())
            }
            other => NodeError::LlmError(other.to_string()),
        }
    }
}
