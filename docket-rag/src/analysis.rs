//! Strengths / weaknesses review of a single legal document.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{RagError, Result};
use crate::generation::GenerationProvider;
use crate::loader::{PdfExtractor, PlainTextExtractor, TextExtractor, normalize_whitespace};

const ANALYSIS_INSTRUCTION: &str = "You are a senior advocate in the Indian legal system, known for \
sharp analytical skills and strategic insight. Review the legal document below and advise the lawyer \
handling the case. Be objective and tactical.

1. positiveAspects: points, evidence, statements or legal arguments in the document that can be \
used to the client's advantage.
2. negativeAspects: weaknesses, risks, unfavourable statements or arguments that could be used \
against the client.
3. strategicAdvice: a concise list of actionable recommendations (next steps, areas of focus, \
lines of argument) based on the above.

Respond with a single JSON object with exactly the keys \"positiveAspects\", \"negativeAspects\" \
and \"strategicAdvice\", each an array of strings, and nothing else.";

/// The structured review returned by [`DocumentAnalyzer`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAnalysis {
    /// Points favourable to the client.
    #[serde(default)]
    pub positive_aspects: Vec<String>,
    /// Points unfavourable to the client.
    #[serde(default)]
    pub negative_aspects: Vec<String>,
    /// Recommended next steps.
    #[serde(default)]
    pub strategic_advice: Vec<String>,
}

/// Reviews a document's text through a [`GenerationProvider`].
pub struct DocumentAnalyzer {
    generator: Arc<dyn GenerationProvider>,
    timeout: Option<Duration>,
}

impl DocumentAnalyzer {
    /// Create an analyzer around `generator`.
    pub fn new(generator: Arc<dyn GenerationProvider>) -> Self {
        Self { generator, timeout: None }
    }

    /// Bound each generation call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The prompt sent for `text`.
    pub fn prompt(text: &str) -> String {
        format!("{ANALYSIS_INSTRUCTION}\n\nDocument text to analyze:\n{text}")
    }

    /// Analyze `text`.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidInput`] if `text` is blank.
    /// - [`RagError::Generation`] if the model fails or its reply is not the
    ///   expected JSON object.
    /// - [`RagError::GenerationTimeout`] if a timeout is set and the model
    ///   does not reply within it.
    pub async fn analyze(&self, text: &str) -> Result<DocumentAnalysis> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RagError::InvalidInput("document text must not be empty".into()));
        }

        let prompt = Self::prompt(text);
        let generation = self.generator.generate(&prompt);
        let reply = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, generation)
                .await
                .map_err(|_| RagError::GenerationTimeout(limit))??,
            None => generation.await?,
        };
        debug!(generator = self.generator.name(), reply_len = reply.len(), "analysis received");

        parse_analysis(&reply).map_err(|e| {
            warn!(generator = self.generator.name(), error = %e, "unparseable analysis");
            RagError::Generation {
                provider: self.generator.name().to_string(),
                message: format!("analysis is not valid JSON: {e}"),
            }
        })
    }

    /// Extract the text of a PDF, `.txt` or `.md` file and analyze it.
    ///
    /// # Errors
    ///
    /// [`RagError::Extraction`] if the file cannot be read or has an
    /// unsupported type, plus the errors of [`analyze`](Self::analyze).
    pub async fn analyze_file(&self, path: &Path) -> Result<DocumentAnalysis> {
        let owned = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || extract_file_text(&owned))
            .await
            .map_err(crate::service::join_error)??;
        self.analyze(&text).await
    }
}

fn extract_file_text(path: &Path) -> Result<String> {
    let extractors: [&dyn TextExtractor; 2] = [&PdfExtractor, &PlainTextExtractor];
    let extractor = extractors.into_iter().find(|x| x.supports(path)).ok_or_else(|| {
        RagError::Extraction { path: path.to_path_buf(), message: "unsupported file type".into() }
    })?;

    let pages: Vec<String> = extractor
        .extract(path)?
        .into_iter()
        .map(|unit| normalize_whitespace(&unit.text))
        .filter(|text| !text.is_empty())
        .collect();
    Ok(pages.join("\n\n"))
}

/// Parse the model's reply, tolerating a Markdown code fence around it.
fn parse_analysis(reply: &str) -> serde_json::Result<DocumentAnalysis> {
    let mut body = reply.trim();
    if let Some(rest) = body.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        body = rest.strip_suffix("```").unwrap_or(rest).trim();
    }
    serde_json::from_str(body)
}
