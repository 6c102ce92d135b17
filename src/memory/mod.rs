//! Conversation memory for agent nodes.

pub mod in_memory;
pub mod provider;

pub use in_memory::InMemoryConversationMemory;
pub use provider::{ConversationMemory, MemoryError};
