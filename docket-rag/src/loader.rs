//! Source document discovery and text extraction.
//!
//! [`DirectoryLoader`] walks a directory, hands every supported file to a
//! [`TextExtractor`] and collects one [`SourceDocument`] per extractable unit
//! (a PDF page, or a whole plain-text file). A file that fails to extract is
//! recorded in the [`LoadReport`] and the scan moves on.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::document::{FileFailure, SourceDocument};
use crate::error::{RagError, Result};

/// Text extracted from one unit of a file, before it becomes a [`SourceDocument`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedUnit {
    /// 1-based page number for paginated formats.
    pub page: Option<u32>,
    /// Raw extracted text.
    pub text: String,
}

/// A format-specific text extractor.
pub trait TextExtractor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Whether this extractor handles the given file.
    fn supports(&self, path: &Path) -> bool;

    /// Extract the units of a single file.
    ///
    /// Units with no text may be returned; the loader skips and counts them.
    fn extract(&self, path: &Path) -> Result<Vec<ExtractedUnit>>;
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

/// Page-level PDF text extraction backed by `lopdf`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn name(&self) -> &str {
        "pdf"
    }

    fn supports(&self, path: &Path) -> bool {
        has_extension(path, &["pdf"])
    }

    fn extract(&self, path: &Path) -> Result<Vec<ExtractedUnit>> {
        let document = lopdf::Document::load(path).map_err(|e| RagError::Extraction {
            path: path.to_path_buf(),
            message: format!("failed to parse PDF: {e}"),
        })?;
        if document.is_encrypted() {
            return Err(RagError::Extraction {
                path: path.to_path_buf(),
                message: "PDF is encrypted".into(),
            });
        }

        let pages = document.get_pages();
        let mut units = Vec::with_capacity(pages.len());
        for &page in pages.keys() {
            match document.extract_text(&[page]) {
                Ok(text) => units.push(ExtractedUnit { page: Some(page), text }),
                Err(e) => {
                    // A single unreadable page is reported as empty so the rest
                    // of the file still loads.
                    warn!(path = %path.display(), page, error = %e, "page text extraction failed");
                    units.push(ExtractedUnit { page: Some(page), text: String::new() });
                }
            }
        }
        Ok(units)
    }
}

/// Whole-file extraction for `.txt` and `.md` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn name(&self) -> &str {
        "text"
    }

    fn supports(&self, path: &Path) -> bool {
        has_extension(path, &["txt", "md"])
    }

    fn extract(&self, path: &Path) -> Result<Vec<ExtractedUnit>> {
        let bytes = fs::read(path).map_err(|e| RagError::Extraction {
            path: path.to_path_buf(),
            message: format!("failed to read file: {e}"),
        })?;
        let text = String::from_utf8(bytes).map_err(|e| RagError::Extraction {
            path: path.to_path_buf(),
            message: format!("file is not valid UTF-8: {e}"),
        })?;
        Ok(vec![ExtractedUnit { page: None, text }])
    }
}

/// Collapse every run of whitespace (line breaks included) into one space.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The outcome of scanning a source directory.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    /// One document per non-empty page or text file, in path then page order.
    #[serde(skip)]
    pub documents: Vec<SourceDocument>,
    /// Number of supported files that were attempted.
    pub files_scanned: usize,
    /// Files that could not be extracted.
    pub files_failed: Vec<FileFailure>,
    /// Pages or files that produced no text.
    pub empty_units_skipped: usize,
}

/// Scans a directory with a set of [`TextExtractor`]s.
pub struct DirectoryLoader {
    extractors: Vec<Box<dyn TextExtractor>>,
}

impl Default for DirectoryLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryLoader {
    /// A loader handling PDF, `.txt` and `.md` files.
    pub fn new() -> Self {
        Self { extractors: vec![Box::new(PdfExtractor), Box::new(PlainTextExtractor)] }
    }

    /// A loader with a custom set of extractors.
    pub fn with_extractors(extractors: Vec<Box<dyn TextExtractor>>) -> Self {
        Self { extractors }
    }

    fn extractor_for(&self, path: &Path) -> Option<&dyn TextExtractor> {
        self.extractors.iter().find(|x| x.supports(path)).map(|x| x.as_ref())
    }

    /// List supported files under `root` in sorted order.
    ///
    /// Entries the walk cannot read are logged and left out; [`load`](Self::load)
    /// also records them as failures.
    pub fn discover(&self, root: &Path) -> Result<Vec<PathBuf>> {
        self.walk(root).map(|(files, _)| files)
    }

    /// Supported files under `root`, plus the entries the walk could not read.
    /// Symbolic links are followed; a dangling link or a loop is a failure.
    fn walk(&self, root: &Path) -> Result<(Vec<PathBuf>, Vec<FileFailure>)> {
        if !root.is_dir() {
            return Err(RagError::SourceDirectory {
                path: root.to_path_buf(),
                message: "not a readable directory".into(),
            });
        }

        let mut files = Vec::new();
        let mut failures = Vec::new();
        for entry in WalkDir::new(root).follow_links(true) {
            match entry {
                Ok(entry) if entry.file_type().is_file() => {
                    if self.extractor_for(entry.path()).is_some() {
                        files.push(entry.into_path());
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    let path = e.path().unwrap_or(root).to_path_buf();
                    warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                    failures.push(FileFailure { path, reason: e.to_string() });
                }
            }
        }

        files.sort();
        failures.sort_by(|a, b| a.path.cmp(&b.path));
        Ok((files, failures))
    }

    /// Scan `root` and extract every supported file.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::SourceDirectory`] if `root` is not a directory or
    /// holds no supported files. Per-file failures, unreadable directory
    /// entries included, are recorded in the report instead.
    pub fn load(&self, root: &Path) -> Result<LoadReport> {
        let (files, walk_failures) = self.walk(root)?;
        if files.is_empty() {
            return Err(RagError::SourceDirectory {
                path: root.to_path_buf(),
                message: "no supported documents found".into(),
            });
        }

        let mut report = LoadReport { files_failed: walk_failures, ..LoadReport::default() };
        for path in &files {
            report.files_scanned += 1;
            // discover() only returns paths some extractor supports
            let Some(extractor) = self.extractor_for(path) else { continue };
            let source = source_name(root, path);

            let units = match extractor.extract(path) {
                Ok(units) => units,
                Err(e) => {
                    warn!(path = %path.display(), extractor = extractor.name(), error = %e, "skipping file");
                    report.files_failed.push(FileFailure { path: path.clone(), reason: e.to_string() });
                    continue;
                }
            };

            let mut produced = 0usize;
            for unit in units {
                let text = normalize_whitespace(&unit.text);
                if text.is_empty() {
                    debug!(source = %source, page = ?unit.page, "no extractable text");
                    report.empty_units_skipped += 1;
                    continue;
                }
                report.documents.push(SourceDocument { source: source.clone(), page: unit.page, text });
                produced += 1;
            }
            if produced == 0 {
                warn!(source = %source, "file produced no text (scanned image or empty file?)");
            }
            debug!(source = %source, units = produced, "loaded file");
        }

        info!(
            files_scanned = report.files_scanned,
            files_failed = report.files_failed.len(),
            documents = report.documents.len(),
            empty_units_skipped = report.empty_units_skipped,
            "source directory loaded"
        );
        Ok(report)
    }
}

/// The identifier stored with each passage: the path relative to the scan
/// root, so equal file names in different folders stay distinct.
fn source_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.to_string_lossy().replace('\\', "/")
}
