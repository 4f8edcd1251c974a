//! Answer synthesis: prompt the generator with retrieved passages.

use std::sync::Arc;

use tracing::debug;

use crate::document::RetrievedChunk;
use crate::error::{RagError, Result};
use crate::generation::GenerationProvider;
use crate::prompt::build_prompt;

/// Turns a question and its retrieved passages into a grounded answer.
pub struct AnswerSynthesizer {
    generator: Arc<dyn GenerationProvider>,
}

impl AnswerSynthesizer {
    /// Create a synthesizer around `generator`.
    pub fn new(generator: Arc<dyn GenerationProvider>) -> Self {
        Self { generator }
    }

    /// The generation backend.
    pub fn generator(&self) -> &Arc<dyn GenerationProvider> {
        &self.generator
    }

    /// Build the prompt for `question` and return the generator's trimmed
    /// answer.
    ///
    /// # Errors
    ///
    /// Propagates generator failures. A blank completion is reported as
    /// [`RagError::Generation`] instead of being returned as an answer.
    pub async fn synthesize(&self, question: &str, matches: &[RetrievedChunk]) -> Result<String> {
        let prompt = build_prompt(question, matches);
        debug!(
            generator = self.generator.name(),
            passages = matches.len(),
            prompt_len = prompt.len(),
            "requesting answer"
        );

        let answer = self.generator.generate(&prompt).await?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(RagError::Generation {
                provider: self.generator.name().to_string(),
                message: "generator returned an empty answer".into(),
            });
        }
        Ok(answer.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::document::ChunkRecord;

    struct Echo {
        reply: String,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GenerationProvider for Echo {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.seen.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.clone())
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn echo(reply: &str) -> Arc<Echo> {
        Arc::new(Echo { reply: reply.into(), seen: Mutex::new(Vec::new()) })
    }

    #[tokio::test]
    async fn answer_is_trimmed_and_prompt_carries_citations() {
        let generator = echo("  Three years.\n");
        let synthesizer = AnswerSynthesizer::new(generator.clone());
        let matches = vec![RetrievedChunk {
            position: 4,
            distance: 0.2,
            record: ChunkRecord {
                source: "limitation_act.pdf".into(),
                page: Some(7),
                text: "Suits on contracts must be brought within three years.".into(),
            },
        }];

        let answer = synthesizer.synthesize("What is the limitation period?", &matches).await.unwrap();
        assert_eq!(answer, "Three years.");

        let prompts = generator.seen.lock().unwrap();
        assert!(prompts[0].contains("[Source: limitation_act.pdf, Page: 7]"));
        assert!(prompts[0].ends_with("Question: What is the limitation period?"));
    }

    #[tokio::test]
    async fn blank_completion_is_a_generation_error() {
        let synthesizer = AnswerSynthesizer::new(echo(" \n "));
        let err = synthesizer.synthesize("Anything?", &[]).await.unwrap_err();
        assert!(matches!(err, RagError::Generation { .. }));
    }
}
