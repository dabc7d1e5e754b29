pub mod chat;
pub mod config;
pub mod ollama;
pub mod openai;

pub use chat::{ChatMessage, Role};
pub use config::{OllamaConfig, OpenAiConfig};
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
