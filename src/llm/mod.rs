mod gateway;
mod gemini;
pub mod prompts;
mod stream;

pub use gateway::LlmGateway;
pub use gemini::GeminiClient;

use crate::error::LlmError;
use futures::Stream;
use std::pin::Pin;

/// Incrementally produced model output; each item is one received chunk
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Trait for remote text generation and embedding
///
/// Implementations perform exactly one remote call per method invocation.
/// Pacing and retries are layered on top by [`LlmGateway`].
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a complete text response for a prompt
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;

    /// Embed a text into a fixed-length vector
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;

    /// Open a streamed completion for a prompt
    async fn stream(&self, prompt: &str) -> Result<TextStream, LlmError>;

    /// Get the dimension of the embeddings
    fn embedding_dimension(&self) -> usize;

    /// Get the model name used for generation
    fn model_name(&self) -> &str;
}
