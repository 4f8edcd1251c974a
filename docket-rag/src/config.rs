//! Configuration for indexing and querying.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Configuration parameters for the document index and query flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Directory scanned for source documents.
    pub source_dir: PathBuf,
    /// Directory holding the persisted index artifacts.
    pub index_dir: PathBuf,
    /// Number of consecutive sentences grouped into one chunk.
    pub sentences_per_chunk: usize,
    /// Number of passages retrieved per question.
    pub top_k: usize,
    /// Maximum number of texts sent to the embedder in one call.
    pub embed_batch_size: usize,
    /// Upper bound on the generation call.
    #[serde(with = "duration_secs")]
    pub generation_timeout: Duration,
    /// Rebuild instead of failing when the persisted index was built with
    /// another embedding model.
    pub rebuild_on_model_mismatch: bool,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("documents/train_docs"),
            index_dir: PathBuf::from("index"),
            sentences_per_chunk: 3,
            top_k: 3,
            embed_batch_size: 32,
            generation_timeout: Duration::from_secs(60),
            rebuild_on_model_mismatch: false,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the directory scanned for source documents.
    pub fn source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.source_dir = dir.into();
        self
    }

    /// Set the directory holding the persisted index.
    pub fn index_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.index_dir = dir.into();
        self
    }

    /// Set the number of sentences per chunk.
    pub fn sentences_per_chunk(mut self, n: usize) -> Self {
        self.config.sentences_per_chunk = n;
        self
    }

    /// Set the number of passages retrieved per question.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the embedding batch size.
    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embed_batch_size = size;
        self
    }

    /// Set the bound on the generation call.
    pub fn generation_timeout(mut self, timeout: Duration) -> Self {
        self.config.generation_timeout = timeout;
        self
    }

    /// Rebuild the index when the persisted one was built with another model.
    pub fn rebuild_on_model_mismatch(mut self, rebuild: bool) -> Self {
        self.config.rebuild_on_model_mismatch = rebuild;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are usable.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `sentences_per_chunk == 0`
    /// - `top_k == 0`
    /// - `embed_batch_size == 0`
    /// - `generation_timeout` is zero
    pub fn build(self) -> Result<RagConfig> {
        if self.config.sentences_per_chunk == 0 {
            return Err(RagError::Config("sentences_per_chunk must be greater than zero".into()));
        }
        if self.config.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".into()));
        }
        if self.config.embed_batch_size == 0 {
            return Err(RagError::Config("embed_batch_size must be greater than zero".into()));
        }
        if self.config.generation_timeout.is_zero() {
            return Err(RagError::Config("generation_timeout must be non-zero".into()));
        }
        Ok(self.config)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_chunk_three_sentences_and_retrieve_three() {
        let config = RagConfig::default();
        assert_eq!(config.sentences_per_chunk, 3);
        assert_eq!(config.top_k, 3);
        assert!(!config.rebuild_on_model_mismatch);
    }

    #[test]
    fn builder_rejects_zero_sizes() {
        assert!(RagConfig::builder().sentences_per_chunk(0).build().is_err());
        assert!(RagConfig::builder().top_k(0).build().is_err());
        assert!(RagConfig::builder().embed_batch_size(0).build().is_err());
        assert!(RagConfig::builder().generation_timeout(Duration::ZERO).build().is_err());
    }

    #[test]
    fn timeout_round_trips_through_json_as_seconds() {
        let config = RagConfig::builder().generation_timeout(Duration::from_millis(1500)).build();
        let config = config.unwrap();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["generation_timeout"], serde_json::json!(1.5));
        let back: RagConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }
}
