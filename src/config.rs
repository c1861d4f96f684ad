//! Configuration types for document-to-audio conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Every value is fixed when the
//! [`crate::JobManager`] starts; there is no runtime reconfiguration.

use crate::error::Doc2AudioError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// Default maximum upload size: 16 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Default soft chunk-size target, in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 300;

/// Configuration for document-to-audio conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_doc2audio::{ConversionConfig, OutputFormat};
///
/// let config = ConversionConfig::builder()
///     .chunk_size(500)
///     .primary_engine("pico2wave")
///     .output_format(OutputFormat::Wav)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Largest accepted upload in bytes. Default: 16 MiB.
    pub max_upload_bytes: usize,

    /// Lower-case document extensions accepted for extraction. Default: `pdf`, `epub`.
    ///
    /// Only extensions with an extractor (`pdf`, `epub`) can ever succeed;
    /// removing one here rejects that format with `UnsupportedFormat`.
    pub allowed_extensions: BTreeSet<String>,

    /// Soft chunk-size target in characters. Default: 300.
    ///
    /// A sentence longer than this is still emitted as one chunk.
    pub chunk_size: usize,

    /// Identifier of the speech engine tried first. Default: `espeak-ng`.
    pub primary_engine: String,

    /// Identifier of the engine tried when the primary fails to load. Default: `espeak`.
    pub fallback_engine: String,

    /// Voice name passed to the engine, if it supports one.
    pub voice: Option<String>,

    /// Encoding of per-chunk and final artifacts. Default: [`OutputFormat::Mp3`].
    pub output_format: OutputFormat,

    /// ffmpeg executable used by [`OutputFormat::Mp3`]. Default: `ffmpeg`.
    pub ffmpeg_path: PathBuf,

    /// Maximum number of pipelines running at once. Default: 2.
    ///
    /// Synthesis is CPU-bound; jobs beyond the cap wait in `processing`
    /// at progress 0 until a slot frees up.
    pub max_concurrent_jobs: usize,

    /// Directory where uploads are stored. Default: `uploads`.
    pub upload_dir: PathBuf,

    /// Root of the per-job output directories. Default: `audiobooks`.
    pub output_dir: PathBuf,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional observer for per-chunk events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_extensions: ["pdf", "epub"].iter().map(|s| s.to_string()).collect(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            primary_engine: "espeak-ng".to_string(),
            fallback_engine: "espeak".to_string(),
            voice: None,
            output_format: OutputFormat::default(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            max_concurrent_jobs: 2,
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("audiobooks"),
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("allowed_extensions", &self.allowed_extensions)
            .field("chunk_size", &self.chunk_size)
            .field("primary_engine", &self.primary_engine)
            .field("fallback_engine", &self.fallback_engine)
            .field("voice", &self.voice)
            .field("output_format", &self.output_format)
            .field("ffmpeg_path", &self.ffmpeg_path)
            .field("max_concurrent_jobs", &self.max_concurrent_jobs)
            .field("upload_dir", &self.upload_dir)
            .field("output_dir", &self.output_dir)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Whether `extension` (any case, without the dot) is accepted.
    pub fn allows_extension(&self, extension: &str) -> bool {
        self.allowed_extensions
            .contains(&extension.to_ascii_lowercase())
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    /// Replace the accepted extensions. Leading dots are stripped.
    pub fn allowed_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.allowed_extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    pub fn chunk_size(mut self, n: usize) -> Self {
        self.config.chunk_size = n;
        self
    }

    pub fn primary_engine(mut self, id: impl Into<String>) -> Self {
        self.config.primary_engine = id.into();
        self
    }

    pub fn fallback_engine(mut self, id: impl Into<String>) -> Self {
        self.config.fallback_engine = id.into();
        self
    }

    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.config.voice = Some(voice.into());
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    pub fn ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ffmpeg_path = path.into();
        self
    }

    pub fn max_concurrent_jobs(mut self, n: usize) -> Self {
        self.config.max_concurrent_jobs = n;
        self
    }

    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Doc2AudioError> {
        let c = &self.config;
        if c.chunk_size == 0 {
            return Err(Doc2AudioError::InvalidConfig(
                "Chunk size must be ≥ 1".into(),
            ));
        }
        if c.max_concurrent_jobs == 0 {
            return Err(Doc2AudioError::InvalidConfig(
                "Max concurrent jobs must be ≥ 1".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(Doc2AudioError::InvalidConfig(
                "Max upload size must be ≥ 1 byte".into(),
            ));
        }
        if c.allowed_extensions.is_empty() {
            return Err(Doc2AudioError::InvalidConfig(
                "At least one document extension must be allowed".into(),
            ));
        }
        if c.primary_engine.trim().is_empty() || c.fallback_engine.trim().is_empty() {
            return Err(Doc2AudioError::InvalidConfig(
                "Engine identifiers must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Encoding of the produced audio.
///
/// | Format | Needs | Notes |
/// |--------|-------|-------|
/// | `Mp3`  | ffmpeg with libmp3lame | VBR `-q:a 0` (default) |
/// | `Wav`  | nothing | 16-bit PCM, lossless, large |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// MPEG-1 Layer III via ffmpeg. (default)
    #[default]
    Mp3,
    /// Uncompressed PCM WAV.
    Wav,
}

impl OutputFormat {
    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "mp3",
            OutputFormat::Wav => "wav",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
