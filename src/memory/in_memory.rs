use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::provider::{ConversationMemory, MemoryError};
use crate::llm::ChatMessage;

/// Process-local memory. Each key keeps at most `capacity` messages.
pub struct InMemoryConversationMemory {
    store: RwLock<HashMap<String, Vec<ChatMessage>>>,
    capacity: usize,
}

impl InMemoryConversationMemory {
    pub fn new() -> Self {
        Self::with_capacity(200)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            store: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }
}

impl Default for InMemoryConversationMemory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationMemory for InMemoryConversationMemory {
    async fn load(&self, key: &str, window: usize) -> Result<Vec<ChatMessage>, MemoryError> {
        let guard = self.store.read();
        let Some(history) = guard.get(key) else {
            return Ok(Vec::new());
        };
        let start = history.len().saturating_sub(window);
        Ok(history[start..].to_vec())
    }

    async fn append(&self, key: &str, messages: Vec<ChatMessage>) -> Result<(), MemoryError> {
        if key.trim().is_empty() {
            return Err(MemoryError::InvalidKey(key.to_string()));
        }
        let mut guard = self.store.write();
        let history = guard.entry(key.to_string()).or_default();
        history.extend(messages);
        if history.len() > self.capacity {
            let excess = history.len() - self.capacity;
            history.drain(..excess);
        }
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<(), MemoryError> {
        self.store.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_window_and_capacity() {
        let memory = InMemoryConversationMemory::with_capacity(3);
        memory
            .append("c1", vec![ChatMessage::user("a"), ChatMessage::assistant("b")])
            .await
            .unwrap();
        memory
            .append("c1", vec![ChatMessage::user("c"), ChatMessage::assistant("d")])
            .await
            .unwrap();

        let all = memory.load("c1", 10).await.unwrap();
        assert_eq!(all.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(), vec!["b", "c", "d"]);
        let last = memory.load("c1", 2).await.unwrap();
        assert_eq!(last[0].content, "c");

        assert!(memory.load("other", 5).await.unwrap().is_empty());
        memory.clear("c1").await.unwrap();
        assert!(memory.load("c1", 5).await.unwrap().is_empty());
        assert!(memory.append(" ", vec![]).await.is_err());
    }
}
