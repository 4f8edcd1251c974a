//! Embedding provider trait for generating vector embeddings from text.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::Result;

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap a specific model (a local sentence-transformer, a
/// remote API, or the deterministic [`HashEmbedder`]) behind a unified async
/// interface. [`model_id`](EmbeddingProvider::model_id) names the model and
/// version; it is persisted with the index and vectors from different models
/// are never compared.
///
/// # Example
///
/// ```rust,ignore
/// use docket_rag::EmbeddingProvider;
///
/// let provider = HashEmbedder::new(384);
/// let embedding = provider.embed("statute of limitations").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    ///
    /// The output has one vector per input, in input order. The default
    /// implementation calls [`embed`](EmbeddingProvider::embed) sequentially;
    /// backends with native batching should override it.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// Return the model identifier (name and version) of this provider.
    fn model_id(&self) -> &str;
}

/// Scale a vector to unit length in place. Zero vectors are left unchanged.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Deterministic lexical embeddings via signed feature hashing.
///
/// Each lower-cased alphanumeric token is hashed with SHA-256 into one of
/// `dimensions` buckets with a hash-derived sign; the result is
/// L2-normalised. Texts sharing more words land closer together. Text with
/// no alphanumeric token (a `* * *` separator page) maps to the zero vector.
/// Useful offline and in tests; it has no notion of synonyms.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
    model_id: String,
}

impl HashEmbedder {
    /// Create an embedder producing vectors of `dimensions` components.
    ///
    /// # Panics
    ///
    /// Panics if `dimensions` is zero.
    pub fn new(dimensions: usize) -> Self {
        assert!(dimensions > 0, "HashEmbedder dimensions must be non-zero");
        Self { dimensions, model_id: format!("hash-v1-{dimensions}") }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let mut tokens = 0usize;
        for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
            tokens += 1;
        }
        if tokens == 0 {
            debug!(dimensions = self.dimensions, "no alphanumeric tokens, zero vector");
        }
        l2_normalize(&mut vector);
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_sync(text)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
