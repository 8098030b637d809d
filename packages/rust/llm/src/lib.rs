//! Chat completion and embedding services for SupportPilot.
//!
//! The pipeline only sees the [`CompletionService`] and [`EmbeddingService`]
//! traits. [`OpenAiClient`] implements both against OpenAI-compatible and
//! Azure OpenAI endpoints.

pub mod client;
pub mod types;

pub use client::OpenAiClient;
pub use types::{ChatMessage, Role};

use async_trait::async_trait;
use supportpilot_shared::{Result, SupportPilotError};

/// Something that turns a conversation into a single text reply.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Send `messages` and return the assistant's reply text.
    ///
    /// `fast` selects the lower-latency model when one is configured.
    async fn chat(&self, messages: &[ChatMessage], fast: bool) -> Result<String>;
}

/// Something that maps texts to embedding vectors.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed every text, preserving input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SupportPilotError::Completion("embedding response was empty".into()))
    }
}
