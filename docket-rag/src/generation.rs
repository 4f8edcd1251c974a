//! Generation provider trait for producing answers from prompts.

use async_trait::async_trait;

use crate::error::Result;

/// An external language model that turns a prompt into text.
///
/// Implementations should surface every failure (transport, quota,
/// malformed or empty response) as [`RagError::Generation`](crate::RagError::Generation)
/// rather than returning placeholder text. Time bounds are applied by the
/// caller.
///
/// # Example
///
/// ```rust,ignore
/// use docket_rag::GenerationProvider;
///
/// let generator = GeminiGenerator::from_env()?;
/// let answer = generator.generate("Question: What is a plaint?").await?;
/// ```
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Name of the backend, used in logs and errors.
    fn name(&self) -> &str;
}
