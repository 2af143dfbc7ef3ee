//! Chat-completion client used for file description and reasoning
//! summaries.
//!
//! A single trait keeps the seam narrow: the service only ever sends a
//! one-shot user prompt and reads back text.

mod describer;
mod openai;

pub use describer::{describe_file, FileMetadata};
pub use openai::OpenAiClient;

use async_trait::async_trait;

/// Trait for chat-completion clients.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send a single user prompt and return the model's text reply.
    async fn complete(&self, prompt: &str, temperature: f64) -> anyhow::Result<String>;
}
