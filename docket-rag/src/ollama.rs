//! Ollama generation provider for locally hosted models.
//!
//! This module is only available when the `ollama` feature is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{RagError, Result};
use crate::generation::GenerationProvider;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.1";

/// A [`GenerationProvider`] that calls an Ollama server's `/api/generate`.
///
/// # Example
///
/// ```rust,ignore
/// use docket_rag::ollama::OllamaGenerator;
///
/// let generator = OllamaGenerator::new().with_model("mistral");
/// ```
pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl Default for OllamaGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl OllamaGenerator {
    /// Create a generator for `http://localhost:11434` and `llama3.1`.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_MODEL.into(),
        }
    }

    /// Read `OLLAMA_HOST` and `OLLAMA_MODEL`, keeping defaults for unset values.
    pub fn from_env() -> Self {
        let mut generator = Self::new();
        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            generator = generator.with_base_url(host);
        }
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            generator = generator.with_model(model);
        }
        generator
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the server URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    error: Option<String>,
}

#[async_trait]
impl GenerationProvider for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(provider = "Ollama", model = %self.model, prompt_len = prompt.len(), "generating");

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&GenerateRequest { model: &self.model, prompt, stream: false })
            .send()
            .await
            .map_err(|e| {
                error!(provider = "Ollama", error = %e, "request failed");
                RagError::Generation { provider: "Ollama".into(), message: format!("request failed: {e}") }
            })?;

        let status = response.status();
        let body: GenerateResponse = response.json().await.map_err(|e| RagError::Generation {
            provider: "Ollama".into(),
            message: format!("failed to parse response ({status}): {e}"),
        })?;

        if let Some(message) = body.error {
            error!(provider = "Ollama", %status, "API error");
            return Err(RagError::Generation { provider: "Ollama".into(), message });
        }
        if body.response.trim().is_empty() {
            return Err(RagError::Generation {
                provider: "Ollama".into(),
                message: "empty response".into(),
            });
        }
        Ok(body.response)
    }

    fn name(&self) -> &str {
        "Ollama"
    }
}
