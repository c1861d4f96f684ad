//! Error types for the edgequake-doc2audio library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Doc2AudioError`]: **Fatal**, the job cannot proceed at all
//!   (unsupported document, extraction failure, no usable engine, nothing
//!   synthesised) or a query cannot be answered (unknown job, job not done).
//!   Stage errors end a job in the `failed` state with the error's display
//!   text recorded verbatim.
//!
//! * [`ChunkError`]: **Non-fatal**, a single chunk could not be turned into
//!   audio. It is carried inside [`crate::pipeline::synth::ChunkOutcome::Skipped`]
//!   and the chunk is left out of the final track. The one exception is
//!   [`ChunkError::EngineUnavailable`], which the pipeline escalates because
//!   no later chunk could succeed either.

use std::path::PathBuf;
use thiserror::Error;

use crate::job::JobId;

/// All fatal errors returned by the edgequake-doc2audio library.
#[derive(Debug, Error)]
pub enum Doc2AudioError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The document's extension is not one of the configured formats.
    #[error("Unsupported document format '{extension}' for '{path}'\nSupported: PDF, EPUB.")]
    UnsupportedFormat { path: PathBuf, extension: String },

    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// An upload carried no content or no usable filename.
    #[error("Invalid upload: {reason}")]
    InvalidUpload { reason: String },

    /// An upload exceeded `max_upload_bytes`.
    #[error("Upload of {size} bytes exceeds the {limit}-byte limit")]
    UploadTooLarge { size: usize, limit: usize },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// The extraction library could not read the document.
    #[error("Text extraction failed for '{path}': {detail}")]
    ExtractionFailed { path: PathBuf, detail: String },

    /// Chunking produced nothing to speak.
    #[error("No valid text chunks found to process in '{path}'")]
    NoContent { path: PathBuf },

    /// Neither the primary nor the fallback speech engine could be loaded.
    #[error("No speech engine available (tried '{primary}', then '{fallback}'): {detail}")]
    EngineUnavailable {
        primary: String,
        fallback: String,
        detail: String,
    },

    /// Every chunk failed; the output would be empty.
    #[error("No audio segments were successfully created ({failed}/{total} chunks failed)")]
    NoAudioProduced { total: usize, failed: usize },

    /// The concatenated track could not be written or encoded.
    #[error("Audio assembly failed for '{path}': {detail}")]
    AssemblyFailed { path: PathBuf, detail: String },

    // ── Query errors ──────────────────────────────────────────────────────
    /// No job with this identifier exists.
    #[error("Job not found: {0}")]
    NotFound(JobId),

    /// The job exists but has not completed (still processing, or failed).
    #[error("Job {id} not completed (status: {status})")]
    NotCompleted { id: JobId, status: String },

    /// The job completed but its artifact is no longer on disk.
    #[error("Audio file for job {id} not found at '{path}'")]
    ArtifactMissing { id: JobId, path: PathBuf },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create, write or move a file the pipeline owns.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (e.g. a blocking task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Doc2AudioError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Doc2AudioError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A non-fatal error for a single chunk.
///
/// Stored in [`crate::pipeline::synth::ChunkOutcome::Skipped`]; the chunk is
/// omitted from the assembled track and the pipeline moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ChunkError {
    /// The speech engine ran but produced no usable waveform.
    #[error("Chunk {index}: synthesis failed: {detail}")]
    SynthesisFailed { index: usize, detail: String },

    /// The intermediate WAV could not be written or encoded.
    #[error("Chunk {index}: encoding failed: {detail}")]
    EncodeFailed { index: usize, detail: String },

    /// The encoded chunk could not be decoded back into samples.
    #[error("Chunk {index}: decoding failed: {detail}")]
    DecodeFailed { index: usize, detail: String },

    /// The synthesizer has no engine; every chunk fails the same way.
    #[error("Chunk {index}: TTS system not properly initialized")]
    EngineUnavailable { index: usize },
}

impl ChunkError {
    /// Index of the chunk this error belongs to.
    pub fn index(&self) -> usize {
        match self {
            ChunkError::SynthesisFailed { index, .. }
            | ChunkError::EncodeFailed { index, .. }
            | ChunkError::DecodeFailed { index, .. }
            | ChunkError::EngineUnavailable { index } => *index,
        }
    }
}
