//! Query-time retrieval: embed the question, search, resolve metadata.

use std::sync::Arc;

use tracing::debug;

use crate::document::RetrievedChunk;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::service::QueryStage;

/// Embeds questions with the index's embedding model and returns the closest
/// passages.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    top_k: usize,
}

impl Retriever {
    /// Create a retriever returning up to `top_k` passages per question.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, top_k: usize) -> Self {
        Self { embedder, top_k }
    }

    /// The configured number of passages per question.
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Retrieve the configured number of passages for `query`.
    pub async fn retrieve(&self, index: &VectorIndex, query: &str) -> Result<Vec<RetrievedChunk>> {
        self.retrieve_k(index, query, self.top_k).await
    }

    /// Retrieve up to `k` passages for `query`, closest first.
    ///
    /// An empty result (e.g. `k == 0`) is valid.
    ///
    /// # Errors
    ///
    /// Failures are wrapped in [`RagError::Query`] tagged with the stage
    /// that failed: [`RagError::InvalidInput`] for a blank query or one
    /// without letters or digits,
    /// [`RagError::ModelMismatch`] if the index was built with a different
    /// embedding model, embedding and search errors as returned.
    pub async fn retrieve_k(
        &self,
        index: &VectorIndex,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::InvalidInput("question must not be empty".into())
                .at_stage(QueryStage::Embedding));
        }
        if !query.chars().any(char::is_alphanumeric) {
            return Err(RagError::InvalidInput("question has no letters or digits".into())
                .at_stage(QueryStage::Embedding));
        }
        if self.embedder.model_id() != index.embedding_model() {
            return Err(RagError::ModelMismatch {
                expected: self.embedder.model_id().to_string(),
                found: index.embedding_model().to_string(),
            }
            .at_stage(QueryStage::Embedding));
        }

        let query_vector =
            self.embedder.embed(query).await.map_err(|e| e.at_stage(QueryStage::Embedding))?;

        let matches =
            index.search_records(&query_vector, k).map_err(|e| e.at_stage(QueryStage::Searching))?;

        debug!(k, match_count = matches.len(), "retrieval completed");
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ChunkRecord;
    use crate::embedding::HashEmbedder;
    use crate::error::ErrorKind;

    async fn index_for(embedder: &HashEmbedder, texts: &[&str]) -> VectorIndex {
        let embeddings = embedder.embed_batch(texts).await.unwrap();
        let records = texts
            .iter()
            .map(|t| ChunkRecord { source: "brief.pdf".into(), page: Some(1), text: t.to_string() })
            .collect();
        VectorIndex::build(embedder.model_id(), embeddings, records).unwrap()
    }

    #[tokio::test]
    async fn returns_closest_passage_first() {
        let embedder = HashEmbedder::new(128);
        let index = index_for(&embedder, &["bail hearing procedure", "appeal filing deadline"]).await;
        let retriever = Retriever::new(Arc::new(embedder), 2);

        let matches = retriever.retrieve(&index, "deadline for filing an appeal").await.unwrap();
        assert_eq!(matches[0].record.text, "appeal filing deadline");
        assert!(matches[0].distance <= matches[1].distance);
    }

    #[tokio::test]
    async fn zero_k_is_a_valid_empty_result() {
        let embedder = HashEmbedder::new(16);
        let index = index_for(&embedder, &["anything"]).await;
        let retriever = Retriever::new(Arc::new(embedder), 3);
        assert!(retriever.retrieve_k(&index, "anything", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_query_is_rejected_before_embedding() {
        let embedder = HashEmbedder::new(16);
        let index = index_for(&embedder, &["anything"]).await;
        let retriever = Retriever::new(Arc::new(embedder), 3);
        let err = retriever.retrieve(&index, "   ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Input);
    }

    #[tokio::test]
    async fn punctuation_only_query_is_an_input_error() {
        let embedder = HashEmbedder::new(16);
        let index = index_for(&embedder, &["anything"]).await;
        let retriever = Retriever::new(Arc::new(embedder), 3);
        let err = retriever.retrieve(&index, "???").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Input);
        assert!(matches!(err, RagError::Query { stage: QueryStage::Embedding, .. }));
    }

    #[tokio::test]
    async fn index_from_another_model_is_refused() {
        let index = index_for(&HashEmbedder::new(16), &["anything"]).await;
        let retriever = Retriever::new(Arc::new(HashEmbedder::new(32)), 3);
        let err = retriever.retrieve(&index, "anything").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Consistency);
    }
}
