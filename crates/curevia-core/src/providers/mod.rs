//! Completion providers

pub mod openai_compatible;
pub mod sse;

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;

pub use openai_compatible::OpenAiCompatibleProvider;

/// Forward-only sequence of text fragments
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// One generative call
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_output_tokens: u32,
}

/// A generative completion backend
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the provider can be called at all (credentials present)
    fn is_configured(&self) -> bool {
        true
    }

    /// Open a streamed completion. Implementations stop reading and close
    /// the connection once `cancel` fires.
    async fn stream(
        &self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<TextStream, ProviderError>;
}
