//! Index construction: load → chunk → embed → index.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::chunking::{Chunker, SentenceChunker};
use crate::config::RagConfig;
use crate::document::{Chunk, FileFailure};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::loader::DirectoryLoader;

/// Counters describing one build pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuildReport {
    /// Supported files the loader attempted.
    pub files_scanned: usize,
    /// Files skipped because extraction failed.
    pub files_failed: Vec<FileFailure>,
    /// Pages or text files that produced text.
    pub documents: usize,
    /// Pages or files without any text.
    pub empty_units_skipped: usize,
    /// Documents whose text held no sentences.
    pub empty_documents_skipped: usize,
    /// Chunks embedded into the index.
    pub chunks: usize,
}

/// Builds a [`VectorIndex`] from a source directory.
///
/// Loading and chunking run on the blocking pool; embedding is sent to the
/// provider in slices of `embed_batch_size`.
pub struct IndexBuilder {
    loader: Arc<DirectoryLoader>,
    chunker: SentenceChunker,
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl IndexBuilder {
    /// Create a builder using the chunking and batching settings of `config`.
    pub fn new(config: &RagConfig, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        if config.embed_batch_size == 0 {
            return Err(RagError::Config("embed_batch_size must be greater than zero".into()));
        }
        Ok(Self {
            loader: Arc::new(DirectoryLoader::new()),
            chunker: SentenceChunker::new(config.sentences_per_chunk)?,
            embedder,
            batch_size: config.embed_batch_size,
        })
    }

    /// Replace the default PDF/text loader.
    pub fn with_loader(mut self, loader: DirectoryLoader) -> Self {
        self.loader = Arc::new(loader);
        self
    }

    /// The embedding provider vectors are produced with.
    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Run the full build over `source_dir`.
    ///
    /// # Errors
    ///
    /// - [`RagError::SourceDirectory`] if the directory is missing or has no
    ///   supported files.
    /// - [`RagError::InvalidInput`] if nothing chunkable was extracted.
    /// - [`RagError::Consistency`] if the embedder returns the wrong number
    ///   of vectors or vectors of the wrong size.
    /// - Embedding errors as returned by the provider.
    pub async fn build(&self, source_dir: &Path) -> Result<(VectorIndex, BuildReport)> {
        let loader = Arc::clone(&self.loader);
        let chunker = self.chunker;
        let root = source_dir.to_path_buf();

        let (chunks, mut report) = tokio::task::spawn_blocking(move || {
            let load = loader.load(&root)?;
            let mut report = BuildReport {
                files_scanned: load.files_scanned,
                files_failed: load.files_failed,
                documents: load.documents.len(),
                empty_units_skipped: load.empty_units_skipped,
                ..BuildReport::default()
            };
            let mut chunks = Vec::new();
            for document in &load.documents {
                let produced = chunker.chunk(document);
                if produced.is_empty() {
                    report.empty_documents_skipped += 1;
                }
                chunks.extend(produced);
            }
            Ok::<_, RagError>((chunks, report))
        })
        .await
        .map_err(crate::service::join_error)??;

        if chunks.is_empty() {
            return Err(RagError::InvalidInput(format!(
                "no text could be chunked from {}",
                source_dir.display()
            )));
        }

        let embeddings = self.embed_chunks(&chunks).await?;
        report.chunks = chunks.len();

        let records = chunks.into_iter().map(Chunk::into_record).collect();
        let index = VectorIndex::build(self.embedder.model_id(), embeddings, records)?;

        info!(
            files_scanned = report.files_scanned,
            files_failed = report.files_failed.len(),
            documents = report.documents,
            chunk_count = report.chunks,
            dimensions = index.dimensions(),
            model = index.embedding_model(),
            "index built"
        );
        Ok((index, report))
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let expected_dims = self.embedder.dimensions();
        let mut embeddings = Vec::with_capacity(chunks.len());

        for (batch_no, batch) in chunks.chunks(self.batch_size).enumerate() {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let vectors = self.embedder.embed_batch(&texts).await.map_err(|e| {
                error!(batch = batch_no, error = %e, "embedding failed during build");
                e
            })?;

            if vectors.len() != texts.len() {
                return Err(RagError::Consistency(format!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    texts.len()
                )));
            }
            if let Some(bad) = vectors.iter().find(|v| v.len() != expected_dims) {
                return Err(RagError::Consistency(format!(
                    "embedder returned a {}-dimensional vector, expected {expected_dims}",
                    bad.len()
                )));
            }
            embeddings.extend(vectors);
        }
        Ok(embeddings)
    }
}
