use async_trait::async_trait;

use crate::llm::ChatMessage;

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("Memory provider error: {0}")]
    ProviderError(String),
    #[error("Invalid memory key: {0}")]
    InvalidKey(String),
}

/// Sliding-window chat history keyed by a caller-chosen conversation key.
#[async_trait]
pub trait ConversationMemory: Send + Sync {
    /// The most recent `window` messages for `key`, oldest first.
    async fn load(&self, key: &str, window: usize) -> Result<Vec<ChatMessage>, MemoryError>;

    async fn append(&self, key: &str, messages: Vec<ChatMessage>) -> Result<(), MemoryError>;

    async fn clear(&self, key: &str) -> Result<(), MemoryError>;
}
