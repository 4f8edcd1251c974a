//! Sentence-window chunking.
//!
//! Documents are split into sentences with Unicode (UAX #29) sentence
//! boundaries and grouped into consecutive, non-overlapping windows of a fixed
//! number of sentences. Chunks never split a sentence.

use unicode_segmentation::UnicodeSegmentation;

use crate::document::{Chunk, SourceDocument};
use crate::error::{RagError, Result};

/// A strategy for splitting documents into chunks.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has no text. Each returned
    /// chunk carries the document's source and page unchanged.
    fn chunk(&self, document: &SourceDocument) -> Vec<Chunk>;
}

/// Split text into trimmed, non-empty sentences.
pub fn split_sentences(text: &str) -> Vec<&str> {
    text.split_sentence_bounds().map(str::trim).filter(|s| !s.is_empty()).collect()
}

/// Groups `sentences_per_chunk` consecutive sentences into one chunk.
///
/// # Example
///
/// ```rust,ignore
/// use docket_rag::SentenceChunker;
///
/// let chunker = SentenceChunker::new(3)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SentenceChunker {
    sentences_per_chunk: usize,
}

impl Default for SentenceChunker {
    fn default() -> Self {
        Self { sentences_per_chunk: 3 }
    }
}

impl SentenceChunker {
    /// Create a chunker grouping `sentences_per_chunk` sentences per chunk.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if `sentences_per_chunk` is zero.
    pub fn new(sentences_per_chunk: usize) -> Result<Self> {
        if sentences_per_chunk == 0 {
            return Err(RagError::Config("sentences_per_chunk must be greater than zero".into()));
        }
        Ok(Self { sentences_per_chunk })
    }

    /// The configured window size.
    pub fn sentences_per_chunk(&self) -> usize {
        self.sentences_per_chunk
    }

    /// Chunk every document in order.
    pub fn chunk_all(&self, documents: &[SourceDocument]) -> Vec<Chunk> {
        documents.iter().flat_map(|doc| self.chunk(doc)).collect()
    }
}

impl Chunker for SentenceChunker {
    fn chunk(&self, document: &SourceDocument) -> Vec<Chunk> {
        let sentences = split_sentences(&document.text);
        sentences
            .chunks(self.sentences_per_chunk)
            .map(|window| Chunk {
                text: window.join(" "),
                source: document.source.clone(),
                page: document.page,
            })
            .collect()
    }
}
