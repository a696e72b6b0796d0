//! LLM client abstraction
//!
//! The gateway forwards questions to an Ollama server as-is. No prompt
//! templating happens here.

mod ollama;

pub use ollama::OllamaClient;

use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Completion returned by the model server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    pub model: String,
    pub response: String,
    #[serde(default)]
    pub done: bool,
}

/// Trait for LLM backends
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Server version. Errors when the server cannot be reached.
    async fn health_check(&self) -> Result<String>;

    /// Models currently available on the server
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Single non-streaming completion
    async fn generate(&self, model: &str, prompt: &str) -> Result<Generation>;
}
