//! Gemini generation provider using the `generateContent` REST API.
//!
//! This module is only available when the `gemini` feature is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{RagError, Result};
use crate::generation::GenerationProvider;

/// The default Gemini API base URL.
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// The default generation model.
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// A [`GenerationProvider`] backed by the Gemini API.
///
/// # Configuration
///
/// - `model` – defaults to `gemini-2.5-flash`.
/// - `api_key` – from the constructor or the `GOOGLE_API_KEY` environment variable.
///
/// # Example
///
/// ```rust,ignore
/// use docket_rag::gemini::GeminiGenerator;
///
/// let generator = GeminiGenerator::from_env()?.with_model("gemini-2.5-pro");
/// let answer = generator.generate("Question: ...").await?;
/// ```
pub struct GeminiGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiGenerator {
    /// Create a new generator with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::Generation {
                provider: "Gemini".into(),
                message: "API key must not be empty".into(),
            });
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model: DEFAULT_MODEL.into(),
            base_url: GEMINI_BASE_URL.into(),
        })
    }

    /// Create a new generator using the `GOOGLE_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GOOGLE_API_KEY").map_err(|_| RagError::Generation {
            provider: "Gemini".into(),
            message: "GOOGLE_API_KEY environment variable not set".into(),
        })?;
        Self::new(api_key)
    }

    /// Set the model name (e.g. `gemini-2.5-pro`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the API base URL (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

// ── Gemini API request/response types ──────────────────────────────

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl GenerateResponse {
    /// Concatenate the text parts of the first candidate.
    fn into_text(self) -> std::result::Result<String, String> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(format!("prompt blocked: {reason}"));
        }
        let candidate = self.candidates.into_iter().next().ok_or("no candidates returned")?;
        let finish_reason = candidate.finish_reason;
        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(match finish_reason {
                Some(reason) => format!("empty response (finish reason: {reason})"),
                None => "empty response".to_string(),
            });
        }
        Ok(text)
    }
}

// ── GenerationProvider implementation ──────────────────────────────

#[async_trait]
impl GenerationProvider for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(provider = "Gemini", model = %self.model, prompt_len = prompt.len(), "generating");

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let request_body = GenerateRequest {
            contents: vec![Content { role: "user", parts: vec![RequestPart { text: prompt }] }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = "Gemini", error = %e, "request failed");
                RagError::Generation { provider: "Gemini".into(), message: format!("request failed: {e}") }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);

            error!(provider = "Gemini", %status, "API error");
            return Err(RagError::Generation {
                provider: "Gemini".into(),
                message: format!("API returned {status}: {detail}"),
            });
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            error!(provider = "Gemini", error = %e, "failed to parse response");
            RagError::Generation {
                provider: "Gemini".into(),
                message: format!("failed to parse response: {e}"),
            }
        })?;

        parsed
            .into_text()
            .map_err(|message| RagError::Generation { provider: "Gemini".into(), message })
    }

    fn name(&self) -> &str {
        "Gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> std::result::Result<String, String> {
        serde_json::from_str::<GenerateResponse>(json).unwrap().into_text()
    }

    #[test]
    fn joins_text_parts_of_first_candidate() {
        let text = parse(
            r#"{"candidates":[{"content":{"parts":[{"text":"Three "},{"text":"years."}]},"finishReason":"STOP"}]}"#,
        );
        assert_eq!(text.unwrap(), "Three years.");
    }

    #[test]
    fn blocked_prompt_is_an_error() {
        let err = parse(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap_err();
        assert!(err.contains("SAFETY"));
    }

    #[test]
    fn empty_candidate_reports_finish_reason() {
        let err = parse(r#"{"candidates":[{"finishReason":"MAX_TOKENS"}]}"#).unwrap_err();
        assert!(err.contains("MAX_TOKENS"));
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(GeminiGenerator::new("").is_err());
    }
}
