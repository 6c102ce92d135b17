pub mod openai;

pub use openai::{OpenAiCompatibleModel, OpenAiConfig};
