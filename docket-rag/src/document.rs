//! Data types for source documents, chunks, retrieval results and answers.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Text extracted from one unit of a source file.
///
/// PDFs produce one document per page (`page` is 1-based); plain-text files
/// produce a single document with no page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceDocument {
    /// The file name the text came from.
    pub source: String,
    /// The 1-based page number, when the format is paginated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// The extracted text.
    pub text: String,
}

/// A window of consecutive sentences from one [`SourceDocument`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// The sentences of this chunk joined by a single space. Never empty.
    pub text: String,
    /// The file name of the parent document.
    pub source: String,
    /// The page of the parent document, if any.
    pub page: Option<u32>,
}

impl Chunk {
    /// Convert into the metadata record stored alongside the vector index.
    pub fn into_record(self) -> ChunkRecord {
        ChunkRecord { source: self.source, page: self.page, text: self.text }
    }
}

/// Per-position metadata stored in parallel with the index vectors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkRecord {
    /// The file name the passage came from.
    pub source: String,
    /// The page the passage came from, if any.
    pub page: Option<u32>,
    /// The passage text.
    pub text: String,
}

impl ChunkRecord {
    /// The `[Source: <id>, Page: <n>]` tag used in prompts.
    pub fn citation(&self) -> Citation<'_> {
        Citation { source: &self.source, page: self.page }
    }
}

/// Display adapter for a passage citation.
#[derive(Debug, Clone, Copy)]
pub struct Citation<'a> {
    source: &'a str,
    page: Option<u32>,
}

impl fmt::Display for Citation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.page {
            Some(page) => write!(f, "[Source: {}, Page: {page}]", self.source),
            None => write!(f, "[Source: {}, Page: n/a]", self.source),
        }
    }
}

/// A raw nearest-neighbour match: an index position and its distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Position of the matched vector in the index.
    pub position: usize,
    /// Squared Euclidean distance to the query (lower is closer).
    pub distance: f32,
}

/// A [`SearchHit`] resolved to its chunk metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Position of the matched vector in the index.
    pub position: usize,
    /// Squared Euclidean distance to the query (lower is closer).
    pub distance: f32,
    /// The chunk's metadata and text.
    pub record: ChunkRecord,
}

/// A passage reference returned with an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    /// The file name of the passage.
    pub source: String,
    /// The page of the passage, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Distance of the passage to the question.
    pub distance: f32,
}

impl From<&RetrievedChunk> for SourceRef {
    fn from(chunk: &RetrievedChunk) -> Self {
        Self {
            source: chunk.record.source.clone(),
            page: chunk.record.page,
            distance: chunk.distance,
        }
    }
}

/// The answer returned to the collaborating web layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaAnswer {
    /// The question as asked (trimmed).
    pub question: String,
    /// The generated answer (trimmed).
    pub answer: String,
    /// Passages supplied to the generator, closest first.
    pub sources: Vec<SourceRef>,
}

/// A file that could not be loaded, recorded instead of aborting the scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    /// The file that failed.
    pub path: PathBuf,
    /// Why it failed.
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn citation_renders_page_or_placeholder() {
        let paged = ChunkRecord { source: "lease.pdf".into(), page: Some(4), text: "x".into() };
        assert_eq!(paged.citation().to_string(), "[Source: lease.pdf, Page: 4]");

        let flat = ChunkRecord { source: "notes.txt".into(), page: None, text: "x".into() };
        assert_eq!(flat.citation().to_string(), "[Source: notes.txt, Page: n/a]");
    }
}
