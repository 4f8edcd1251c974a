//! Local sentence-transformer embeddings with candle.
//!
//! This module is only available when the `local` feature is enabled. It
//! runs a BERT-family model (such as `all-MiniLM-L6-v2`) on the CPU from a
//! directory holding `config.json`, `tokenizer.json` and `model.safetensors`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// Default model name, recorded in the model id.
const DEFAULT_MODEL_NAME: &str = "all-MiniLM-L6-v2";

/// Tokens beyond this are truncated; MiniLM was trained on 256.
const MAX_SEQUENCE_LEN: usize = 256;

fn embedding_error(message: impl std::fmt::Display) -> RagError {
    RagError::Embedding { provider: "local".into(), message: message.to_string() }
}

struct BertInner {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

/// An [`EmbeddingProvider`] running a BERT sentence-transformer in-process.
///
/// Embeddings are the attention-masked mean of the last hidden state,
/// L2-normalised.
pub struct LocalBertEmbedder {
    inner: Arc<BertInner>,
    dimensions: usize,
    model_id: String,
}

impl LocalBertEmbedder {
    /// Load the model found in `model_dir`.
    pub fn from_dir(model_dir: impl AsRef<Path>) -> Result<Self> {
        Self::from_dir_named(model_dir, DEFAULT_MODEL_NAME)
    }

    /// Load the model found in `model_dir`, recording `name` in the model id.
    pub fn from_dir_named(model_dir: impl AsRef<Path>, name: &str) -> Result<Self> {
        let model_dir = model_dir.as_ref();
        let device = Device::Cpu;

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            embedding_error(format!("failed to load tokenizer from {}: {e}", tokenizer_path.display()))
        })?;

        let config_path = model_dir.join("config.json");
        let config: BertConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;

        let weights_path = model_dir.join("model.safetensors");
        let weights = candle_core::safetensors::load(&weights_path, &device).map_err(|e| {
            embedding_error(format!("failed to load weights from {}: {e}", weights_path.display()))
        })?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = BertModel::load(vb, &config).map_err(embedding_error)?;

        let dimensions = config.hidden_size;
        info!(model = name, dimensions, dir = %model_dir.display(), "local embedding model loaded");

        Ok(Self {
            inner: Arc::new(BertInner { model, tokenizer, device }),
            dimensions,
            model_id: format!("local/{name}@{dimensions}"),
        })
    }

    /// Resolve the model directory from `DOCKET_MODEL_DIR`, falling back to
    /// `models/all-MiniLM-L6-v2`.
    pub fn from_env() -> Result<Self> {
        let dir = std::env::var("DOCKET_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("models").join(DEFAULT_MODEL_NAME));
        if !dir.is_dir() {
            return Err(embedding_error(format!("model directory {} not found", dir.display())));
        }
        Self::from_dir(dir)
    }
}

impl BertInner {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut encodings = Vec::with_capacity(texts.len());
        for text in texts {
            let encoding = self
                .tokenizer
                .encode(text.as_str(), true)
                .map_err(|e| embedding_error(format!("tokenization failed: {e}")))?;
            let mut ids = encoding.get_ids().to_vec();
            let mut mask = encoding.get_attention_mask().to_vec();
            ids.truncate(MAX_SEQUENCE_LEN);
            mask.truncate(MAX_SEQUENCE_LEN);
            encodings.push((ids, mask));
        }

        let seq_len = encodings.iter().map(|(ids, _)| ids.len()).max().unwrap_or(0);
        let batch = encodings.len();
        let mut flat_ids = Vec::with_capacity(batch * seq_len);
        let mut flat_mask = Vec::with_capacity(batch * seq_len);
        for (ids, mask) in &encodings {
            let pad = seq_len - ids.len();
            flat_ids.extend(ids.iter().copied().chain(std::iter::repeat_n(0, pad)));
            flat_mask.extend(mask.iter().copied().chain(std::iter::repeat_n(0, pad)));
        }

        let pooled = (|| -> candle_core::Result<Vec<Vec<f32>>> {
            let input_ids = Tensor::from_vec(flat_ids, (batch, seq_len), &self.device)?;
            let attention_mask = Tensor::from_vec(flat_mask, (batch, seq_len), &self.device)?;
            let token_type_ids = input_ids.zeros_like()?;
            let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
            masked_mean_l2(&hidden, &attention_mask)?.to_vec2::<f32>()
        })()
        .map_err(embedding_error)?;

        Ok(pooled)
    }
}

/// Mean of the hidden states over unmasked tokens, scaled to unit length.
fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = attention_mask.to_dtype(hidden.dtype())?.unsqueeze(2)?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    let lengths = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
    let mean = summed.broadcast_div(&lengths)?;
    let norm = mean.sqr()?.sum_keepdim(1)?.sqrt()?.clamp(1e-12, f64::MAX)?;
    mean.broadcast_div(&norm)
}

#[async_trait]
impl EmbeddingProvider for LocalBertEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| embedding_error("model returned no embedding"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = "local", batch_size = texts.len(), "embedding batch");

        let inner = Arc::clone(&self.inner);
        let owned: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        tokio::task::spawn_blocking(move || inner.embed_batch(&owned))
            .await
            .map_err(|e| embedding_error(format!("embedding task failed: {e}")))?
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pooling_ignores_padding_and_normalises() {
        let hidden = Tensor::new(&[[[3.0f32, 4.0], [100.0, 100.0]]], &Device::Cpu).unwrap();
        let mask = Tensor::new(&[[1u32, 0]], &Device::Cpu).unwrap();
        let pooled = masked_mean_l2(&hidden, &mask).unwrap().to_vec2::<f32>().unwrap();
        assert!((pooled[0][0] - 0.6).abs() < 1e-5);
        assert!((pooled[0][1] - 0.8).abs() < 1e-5);
    }

    #[test]
    fn missing_model_directory_is_an_embedding_error() {
        let temp = tempfile::tempdir().unwrap();
        let err = LocalBertEmbedder::from_dir(temp.path()).err().unwrap();
        assert!(matches!(err, RagError::Embedding { .. }));
    }
}
