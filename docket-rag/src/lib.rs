//! # docket-rag
//!
//! Retrieval-augmented question answering over a law office's documents.
//!
//! The crate builds a searchable index from a directory of PDFs and text
//! files, persists it, and answers natural-language questions by retrieving
//! the closest passages and handing them, with citations, to an external
//! generation model.
//!
//! ## Pipeline
//!
//! ```text
//! DirectoryLoader → SentenceChunker → EmbeddingProvider → VectorIndex ⇄ persist
//!                                                              ↓
//!                           question → Retriever → AnswerSynthesizer → QaAnswer
//! ```
//!
//! [`DocumentQa`] ties the pieces together behind one call,
//! [`DocumentQa::answer_question`].
//!
//! ## Features
//!
//! - `local` – [`local::LocalBertEmbedder`], a candle sentence-transformer
//! - `openai` – [`openai::OpenAIEmbeddingProvider`]
//! - `gemini` – [`gemini::GeminiGenerator`]
//! - `ollama` – [`ollama::OllamaGenerator`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docket_rag::{DocumentQa, HashEmbedder, RagConfig};
//!
//! let qa = DocumentQa::builder()
//!     .config(RagConfig::builder().source_dir("documents/train_docs").build()?)
//!     .embedding_provider(Arc::new(HashEmbedder::default()))
//!     .generation_provider(Arc::new(docket_rag::gemini::GeminiGenerator::from_env()?))
//!     .build()?;
//!
//! qa.ensure_ready().await?;
//! let answer = qa.answer_question("How is a civil suit instituted?").await?;
//! println!("{}", answer.answer);
//! ```

mod analysis;
mod builder;
mod chunking;
mod config;
mod document;
mod embedding;
mod error;
mod generation;
mod index;
mod loader;
pub mod persist;
mod prompt;
mod retriever;
mod service;
mod synthesizer;

#[cfg(feature = "gemini")]
pub mod gemini;
#[cfg(feature = "local")]
pub mod local;
#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(feature = "openai")]
pub mod openai;

pub use analysis::{DocumentAnalysis, DocumentAnalyzer};
pub use builder::{BuildReport, IndexBuilder};
pub use chunking::{Chunker, SentenceChunker, split_sentences};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{
    Chunk, ChunkRecord, Citation, FileFailure, QaAnswer, RetrievedChunk, SearchHit, SourceDocument,
    SourceRef,
};
pub use embedding::{EmbeddingProvider, HashEmbedder, l2_normalize};
pub use error::{ErrorKind, RagError, Result};
pub use generation::GenerationProvider;
pub use index::{VectorIndex, squared_l2};
pub use loader::{
    DirectoryLoader, ExtractedUnit, LoadReport, PdfExtractor, PlainTextExtractor, TextExtractor,
    normalize_whitespace,
};
pub use persist::{ArtifactState, IndexManifest};
pub use prompt::{LEGAL_ASSISTANT_INSTRUCTION, NO_CONTEXT, build_prompt, format_context};
pub use retriever::Retriever;
pub use service::{DocumentQa, DocumentQaBuilder, IndexHandle, IndexState, QueryStage};
pub use synthesizer::AnswerSynthesizer;
