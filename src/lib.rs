//! # edgequake-doc2audio
//!
//! Turn PDF and EPUB documents into a single spoken-audio file.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / EPUB
//!  │
//!  ├─ 1. Input     resolve local file or download from URL
//!  ├─ 2. Extract   pdfium page text / EPUB spine documents (spawn_blocking)
//!  ├─ 3. Chunk     sentence-respecting chunks of ≤ chunk_size characters
//!  ├─ 4. Speak     one TTS call per chunk, primary engine or fallback
//!  ├─ 5. Assemble  decoded segments concatenated in order, encoded once
//!  └─ 6. Output    output_dir/{job id}/audiobook.{mp3,wav}
//! ```
//!
//! A chunk that fails to synthesize is logged and left out; the job still
//! completes as long as at least one chunk produced audio.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_doc2audio::{ConversionConfig, JobManager, JobStatus};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = JobManager::new(ConversionConfig::default());
//!     let id = manager.submit("novel.epub").await;
//!
//!     let mut progress = manager.watch(id).await?;
//!     while let Some(job) = progress.next().await {
//!         eprintln!("{:>5.1}%  {}", job.progress, job.status);
//!     }
//!
//!     let (artifact, _file) = manager.download(id).await?;
//!     println!("{} → {}", artifact.download_name, artifact.path.display());
//!     assert_eq!(manager.status(id).await?.status, JobStatus::Completed);
//!     Ok(())
//! }
//! ```
//!
//! ## External programs
//!
//! | Need | Program | When |
//! |------|---------|------|
//! | Speech | `espeak-ng`, `espeak`, `pico2wave` or `text2wave` | always (one of the configured engines) |
//! | MP3 | `ffmpeg` with libmp3lame | `OutputFormat::Mp3` (default) |
//! | PDF text | pdfium shared library | PDF input; `PDFIUM_LIB_PATH`, `./` or system path |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `doc2audio` binary (clap + anyhow + indicatif + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod job;
pub mod manager;
pub mod pipeline;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, OutputFormat};
pub use convert::{convert_to_file, inspect, ConversionPipeline, ConversionStats, DocumentSummary};
pub use error::{ChunkError, Doc2AudioError};
pub use job::{ConversionJob, JobHandle, JobId, JobStatus};
pub use manager::{ArtifactRef, JobManager};
pub use pipeline::assemble::AssembledAudio;
pub use pipeline::chunk::{chunk_text, TextChunk};
pub use pipeline::engine::{CommandEngineFactory, EngineFactory, SpeechEngine};
pub use pipeline::extract::{DocumentKind, Extractors, TextExtractor};
pub use pipeline::synth::{ChunkOutcome, Synthesizer};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::JobStream;
