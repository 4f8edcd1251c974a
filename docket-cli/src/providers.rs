//! Construction of the embedding and generation backends selected on the
//! command line.

use std::sync::Arc;

use anyhow::{Result, bail};
use clap::ValueEnum;
use docket_rag::{EmbeddingProvider, GenerationProvider, HashEmbedder};

/// Embedding backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbedderKind {
    /// Deterministic lexical hashing; no model download.
    Hash,
    /// Local BERT sentence-transformer (`DOCKET_MODEL_DIR`).
    Local,
    /// OpenAI embeddings API (`OPENAI_API_KEY`).
    Openai,
}

/// Generation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GeneratorKind {
    /// Gemini API (`GOOGLE_API_KEY`).
    Gemini,
    /// Ollama server (`OLLAMA_HOST`, `OLLAMA_MODEL`).
    Ollama,
}

pub fn embedder(kind: EmbedderKind, hash_dims: usize) -> Result<Arc<dyn EmbeddingProvider>> {
    match kind {
        EmbedderKind::Hash => {
            if hash_dims == 0 {
                bail!("--hash-dims must be greater than zero");
            }
            Ok(Arc::new(HashEmbedder::new(hash_dims)))
        }
        #[cfg(feature = "local")]
        EmbedderKind::Local => Ok(Arc::new(docket_rag::local::LocalBertEmbedder::from_env()?)),
        #[cfg(not(feature = "local"))]
        EmbedderKind::Local => bail!("this build of docket does not include the `local` feature"),
        #[cfg(feature = "openai")]
        EmbedderKind::Openai => {
            Ok(Arc::new(docket_rag::openai::OpenAIEmbeddingProvider::from_env()?))
        }
        #[cfg(not(feature = "openai"))]
        EmbedderKind::Openai => bail!("this build of docket does not include the `openai` feature"),
    }
}

pub fn generator(kind: GeneratorKind) -> Result<Arc<dyn GenerationProvider>> {
    match kind {
        #[cfg(feature = "gemini")]
        GeneratorKind::Gemini => Ok(Arc::new(docket_rag::gemini::GeminiGenerator::from_env()?)),
        #[cfg(not(feature = "gemini"))]
        GeneratorKind::Gemini => bail!("this build of docket does not include the `gemini` feature"),
        #[cfg(feature = "ollama")]
        GeneratorKind::Ollama => Ok(Arc::new(docket_rag::ollama::OllamaGenerator::from_env())),
        #[cfg(not(feature = "ollama"))]
        GeneratorKind::Ollama => bail!("this build of docket does not include the `ollama` feature"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_embedder_needs_no_environment() {
        let embedder = embedder(EmbedderKind::Hash, 128).unwrap();
        assert_eq!(embedder.model_id(), "hash-v1-128");
    }

    #[test]
    fn zero_hash_dimensions_are_rejected() {
        assert!(embedder(EmbedderKind::Hash, 0).is_err());
    }
}
