//! Error types for the `docket-rag` crate.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::service::QueryStage;

/// Coarse classification of a [`RagError`].
///
/// Callers (typically the web layer) use this to map failures onto
/// responses without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request itself was unusable (blank question, empty corpus).
    Input,
    /// A single source file could not be read or parsed.
    Extraction,
    /// Index or metadata disagree with each other or with the embedder.
    Consistency,
    /// An embedding or generation backend failed or timed out.
    ExternalDependency,
    /// A query arrived before the index was ready.
    NotReady,
    /// Local I/O, serialization or configuration problems.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Input => "input",
            ErrorKind::Extraction => "extraction",
            ErrorKind::Consistency => "consistency",
            ErrorKind::ExternalDependency => "external_dependency",
            ErrorKind::NotReady => "not_ready",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while building or querying the document index.
#[derive(Debug, Error)]
pub enum RagError {
    /// The caller supplied an unusable argument.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The source directory is missing or contains nothing to index.
    #[error("Source directory {path}: {message}")]
    SourceDirectory {
        /// The directory that was scanned.
        path: PathBuf,
        /// Why it could not be used.
        message: String,
    },

    /// Text extraction from a single file failed.
    #[error("Extraction failed for {path}: {message}")]
    Extraction {
        /// The file that could not be extracted.
        path: PathBuf,
        /// A description of the failure.
        message: String,
    },

    /// Parallel structures disagree (vectors vs. metadata, dimensions, files).
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// A persisted index was built with a different embedding model.
    #[error("Index was built with embedding model '{found}', but '{expected}' is configured")]
    ModelMismatch {
        /// The model id the caller expects.
        expected: String,
        /// The model id recorded with the index.
        found: String,
    },

    /// The binary index file is malformed.
    #[error("Index format error: {0}")]
    IndexFormat(String),

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The generation backend failed or returned an unusable response.
    #[error("Generation error ({provider}): {message}")]
    Generation {
        /// The generation provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The generation call did not complete within the configured bound.
    #[error("Generation timed out after {0:?}")]
    GenerationTimeout(std::time::Duration),

    /// A query arrived while the index was not ready to serve.
    #[error("Index not ready (state: {0})")]
    IndexNotReady(String),

    /// A query failed at a specific stage of the query flow.
    #[error("Query failed while {stage}: {source}")]
    Query {
        /// The stage that was running when the failure occurred.
        stage: QueryStage,
        /// The underlying failure.
        #[source]
        source: Box<RagError>,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local file system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// Classify this error.
    ///
    /// [`RagError::Query`] reports the kind of the failure it wraps.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::InvalidInput(_) | RagError::SourceDirectory { .. } => ErrorKind::Input,
            RagError::Extraction { .. } => ErrorKind::Extraction,
            RagError::Consistency(_) | RagError::ModelMismatch { .. } | RagError::IndexFormat(_) => {
                ErrorKind::Consistency
            }
            RagError::Embedding { .. }
            | RagError::Generation { .. }
            | RagError::GenerationTimeout(_) => ErrorKind::ExternalDependency,
            RagError::IndexNotReady(_) => ErrorKind::NotReady,
            RagError::Query { source, .. } => source.kind(),
            RagError::Config(_) | RagError::Io(_) | RagError::Serialization(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Wrap this error with the query stage that produced it.
    pub(crate) fn at_stage(self, stage: QueryStage) -> RagError {
        match self {
            already @ RagError::Query { .. } => already,
            other => RagError::Query { stage, source: Box::new(other) },
        }
    }
}

/// A convenience result type for document index operations.
pub type Result<T> = std::result::Result<T, RagError>;
