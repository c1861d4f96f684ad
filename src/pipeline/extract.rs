//! Text extraction: turn a PDF or EPUB file into one plain-text string.
//!
//! The document kind is decided purely from the file extension, and the
//! extension must also be listed in [`ConversionConfig::allowed_extensions`].
//! Anything else is rejected with [`Doc2AudioError::UnsupportedFormat`]
//! before a single byte of the file is read.
//!
//! Both backends are synchronous C/zip readers, so [`Extractors::extract`]
//! runs them on the blocking pool.

use crate::config::ConversionConfig;
use crate::error::Doc2AudioError;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Supported document types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Epub,
}

impl DocumentKind {
    /// Map a bare extension (any case) to a kind.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "epub" => Some(DocumentKind::Epub),
            _ => None,
        }
    }

    /// Classify `path`, honouring the configured extension allow-list.
    pub fn detect(path: &Path, config: &ConversionConfig) -> Result<Self, Doc2AudioError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        match DocumentKind::from_extension(&extension) {
            Some(kind) if config.allows_extension(&extension) => Ok(kind),
            _ => Err(Doc2AudioError::UnsupportedFormat {
                path: path.to_path_buf(),
                extension,
            }),
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Epub => "epub",
        })
    }
}

/// Reads the text of one kind of document.
///
/// Implementations are blocking. Any library error must be reported as
/// [`Doc2AudioError::ExtractionFailed`]; partial text is never returned.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<String, Doc2AudioError>;
}

fn extraction_failed(path: &Path, detail: impl fmt::Display) -> Doc2AudioError {
    Doc2AudioError::ExtractionFailed {
        path: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

// ── PDF ──────────────────────────────────────────────────────────────────

/// Page text via pdfium, pages joined with `\n`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extract(&self, path: &Path) -> Result<String, Doc2AudioError> {
        let pdfium = load_pdfium()
            .map_err(|e| extraction_failed(path, format!("pdfium unavailable: {e}")))?;
        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| extraction_failed(path, e))?;

        let mut pages = Vec::new();
        for (index, page) in document.pages().iter().enumerate() {
            let text = page
                .text()
                .map_err(|e| extraction_failed(path, format!("page {}: {e}", index + 1)))?
                .all();
            pages.push(text);
        }

        debug!("PDF {}: {} pages", path.display(), pages.len());
        Ok(pages.join("\n"))
    }
}

/// Bind pdfium from `PDFIUM_LIB_PATH` (file or directory), then the working
/// directory, then the system library path.
fn load_pdfium() -> Result<Pdfium, PdfiumError> {
    if let Some(value) = std::env::var_os("PDFIUM_LIB_PATH") {
        let path = PathBuf::from(value);
        let lib = if path.is_dir() {
            Pdfium::pdfium_platform_library_name_at_path(&path)
        } else {
            path
        };
        if let Ok(bindings) = Pdfium::bind_to_library(&lib) {
            return Ok(Pdfium::new(bindings));
        }
        debug!("PDFIUM_LIB_PATH={} could not be bound", lib.display());
    }

    let local = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&local) {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(local_err) => match Pdfium::bind_to_system_library() {
            Ok(bindings) => Ok(Pdfium::new(bindings)),
            Err(_) => Err(local_err),
        },
    }
}

// ── EPUB ─────────────────────────────────────────────────────────────────

/// Spine content documents in reading order, markup stripped.
#[derive(Debug, Default, Clone, Copy)]
pub struct EpubExtractor;

impl TextExtractor for EpubExtractor {
    fn extract(&self, path: &Path) -> Result<String, Doc2AudioError> {
        let mut doc = epub::doc::EpubDoc::new(path).map_err(|e| extraction_failed(path, e))?;

        let mut sections = Vec::new();
        let mut items = 0usize;
        loop {
            items += 1;
            if let Some((content, mime)) = doc.get_current_str() {
                if mime.contains("html") {
                    let text = strip_markup(&content);
                    if !text.is_empty() {
                        sections.push(text);
                    }
                }
            }
            if !doc.go_next() {
                break;
            }
        }

        debug!(
            "EPUB {}: {} spine items, {} with text",
            path.display(),
            items,
            sections.len()
        );
        Ok(sections.join("\n"))
    }
}

static RE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static RE_HIDDEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<head\b.*?</head\s*>|<script\b.*?</script\s*>|<style\b.*?</style\s*>")
        .unwrap()
});
static RE_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(?:p|div|h[1-6]|li|tr|blockquote|section)\s*>")
        .unwrap()
});
static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static RE_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").unwrap());
static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\r\f\u{a0}]+").unwrap());

/// Reduce an (X)HTML document to its readable text.
///
/// Block-level closers become line breaks; blank lines are dropped.
pub fn strip_markup(html: &str) -> String {
    let text = RE_COMMENT.replace_all(html, "");
    let text = RE_HIDDEN.replace_all(&text, "");
    let text = RE_BREAK.replace_all(&text, "\n");
    let text = RE_TAG.replace_all(&text, "");
    let text = RE_ENTITY.replace_all(&text, |caps: &Captures| decode_entity(caps));

    text.lines()
        .map(|line| RE_SPACES.replace_all(line, " ").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entity(caps: &Captures) -> String {
    let body = &caps[1];
    let decoded = if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
    } else if let Some(dec) = body.strip_prefix('#') {
        dec.parse().ok().and_then(char::from_u32)
    } else {
        match body {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            "ndash" => Some('–'),
            "mdash" => Some('—'),
            "hellip" => Some('…'),
            "lsquo" => Some('‘'),
            "rsquo" => Some('’'),
            "ldquo" => Some('“'),
            "rdquo" => Some('”'),
            _ => None,
        }
    };
    decoded.map_or_else(|| caps[0].to_string(), String::from)
}

// ── Dispatch ─────────────────────────────────────────────────────────────

/// One extractor per [`DocumentKind`].
#[derive(Clone)]
pub struct Extractors {
    pdf: Arc<dyn TextExtractor>,
    epub: Arc<dyn TextExtractor>,
}

impl Default for Extractors {
    fn default() -> Self {
        Self {
            pdf: Arc::new(PdfExtractor),
            epub: Arc::new(EpubExtractor),
        }
    }
}

impl fmt::Debug for Extractors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extractors").finish_non_exhaustive()
    }
}

impl Extractors {
    pub fn with_pdf(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.pdf = extractor;
        self
    }

    pub fn with_epub(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.epub = extractor;
        self
    }

    pub fn for_kind(&self, kind: DocumentKind) -> Arc<dyn TextExtractor> {
        match kind {
            DocumentKind::Pdf => Arc::clone(&self.pdf),
            DocumentKind::Epub => Arc::clone(&self.epub),
        }
    }

    /// Extract on the blocking pool.
    pub async fn extract(&self, path: &Path, kind: DocumentKind) -> Result<String, Doc2AudioError> {
        let extractor = self.for_kind(kind);
        let owned = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || extractor.extract(&owned))
            .await
            .map_err(|e| Doc2AudioError::Internal(format!("Extraction task panicked: {e}")))??;

        info!(
            "Extracted {} characters from {} ({})",
            text.chars().count(),
            path.display(),
            kind
        );
        Ok(text)
    }
}
