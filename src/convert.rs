//! The conversion pipeline: one document in, one audio file out.
//!
//! [`ConversionPipeline`] drives a single job through
//! extract → chunk → synthesize (per chunk) → assemble, reporting through the
//! job's [`JobHandle`]. The [`crate::JobManager`] runs one pipeline task per
//! submitted job; [`convert_to_file`] and [`inspect`] use the same stages
//! directly for one-off, in-process use.

use crate::config::ConversionConfig;
use crate::error::{ChunkError, Doc2AudioError};
use crate::job::{ConversionJob, JobHandle, JobId};
use crate::pipeline::assemble::{AssembledAudio, AudioAssembler};
use crate::pipeline::chunk::{chunk_text, TextChunk};
use crate::pipeline::codec::codec_for;
use crate::pipeline::engine::{CommandEngineFactory, EngineFactory};
use crate::pipeline::extract::{DocumentKind, Extractors};
use crate::pipeline::input;
use crate::pipeline::synth::{ChunkOutcome, Synthesizer};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Summary of a finished one-off conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub output_path: PathBuf,
    pub kind: DocumentKind,
    /// Characters of extracted text.
    pub characters: usize,
    pub total_chunks: usize,
    pub produced_chunks: usize,
    pub skipped_chunks: usize,
    pub sample_rate: u32,
    pub duration_secs: f64,
    /// Engine that did the synthesis.
    pub engine: String,
    pub total_duration_ms: u64,
}

/// What a document would turn into, without synthesizing anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub path: PathBuf,
    pub kind: DocumentKind,
    pub characters: usize,
    pub chunks: usize,
}

/// Everything a successful run produced, before it is reduced to a job
/// record or to [`ConversionStats`].
struct PipelineOutput {
    kind: DocumentKind,
    characters: usize,
    chunks: usize,
    assembled: AssembledAudio,
}

/// Orchestrates the stages for one job at a time.
///
/// Cheap to share: the synthesizer (and its engine) is behind an `Arc` and is
/// reused by every job.
pub struct ConversionPipeline {
    config: ConversionConfig,
    extractors: Extractors,
    synthesizer: Arc<Synthesizer>,
}

impl ConversionPipeline {
    pub fn new(
        config: ConversionConfig,
        extractors: Extractors,
        synthesizer: Arc<Synthesizer>,
    ) -> Self {
        Self {
            config,
            extractors,
            synthesizer,
        }
    }

    /// Default extractors and engines loaded through `factory`.
    pub fn with_engine_factory(config: ConversionConfig, factory: &dyn EngineFactory) -> Self {
        let synthesizer = Synthesizer::initialize(
            factory,
            &config.primary_engine,
            &config.fallback_engine,
            codec_for(&config),
        );
        Self::new(config, Extractors::default(), Arc::new(synthesizer))
    }

    /// Default extractors and the built-in command-line engines.
    pub fn from_config(config: ConversionConfig) -> Self {
        let factory = CommandEngineFactory::new(config.voice.clone());
        Self::with_engine_factory(config, &factory)
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    pub fn synthesizer(&self) -> &Arc<Synthesizer> {
        &self.synthesizer
    }

    /// Run the job behind `handle` to a terminal state.
    ///
    /// Never fails: every error ends up in the job record. `work_dir` is
    /// created if needed and receives the final `audiobook.<ext>`.
    pub async fn run(&self, handle: JobHandle, input: &Path, work_dir: &Path) {
        match self.execute(&handle, input, work_dir).await {
            Ok(output) => handle.complete(&output.assembled.path),
            Err(e) => handle.fail(e.to_string()),
        }
    }

    /// Convert `input` (path or URL) straight to `output`.
    pub async fn convert_to_file(
        &self,
        input: &str,
        output: &Path,
    ) -> Result<ConversionStats, Doc2AudioError> {
        let start = Instant::now();
        let resolved = input::resolve_input(
            input,
            self.config.download_timeout_secs,
            self.config.max_upload_bytes,
        )
        .await?;
        let path = resolved.path().to_path_buf();

        let parent = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Doc2AudioError::io(parent, e))?;
        let work_dir = tempfile::Builder::new()
            .prefix(".doc2audio-")
            .tempdir_in(parent)
            .map_err(|e| Doc2AudioError::io(parent, e))?;

        let source_name = display_name(&path);
        let job = ConversionJob::new(JobId::from_raw(0), &path, source_name);
        let (handle, _rx) = JobHandle::new(job);
        let result = self.execute(&handle, &path, work_dir.path()).await;
        let out = match result {
            Ok(out) => out,
            Err(e) => {
                handle.fail(e.to_string());
                return Err(e);
            }
        };

        tokio::fs::rename(&out.assembled.path, output)
            .await
            .map_err(|e| Doc2AudioError::io(output, e))?;
        handle.complete(output);

        Ok(ConversionStats {
            output_path: output.to_path_buf(),
            kind: out.kind,
            characters: out.characters,
            total_chunks: out.chunks,
            produced_chunks: out.assembled.segments,
            skipped_chunks: out.assembled.skipped,
            sample_rate: out.assembled.sample_rate,
            duration_secs: out.assembled.duration_secs,
            engine: self.synthesizer.engine_name().unwrap_or_default().to_string(),
            total_duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Extract and chunk `input` (path or URL) without synthesis.
    pub async fn inspect(&self, input: &str) -> Result<DocumentSummary, Doc2AudioError> {
        summarize(input, &self.config, &self.extractors).await
    }

    async fn execute(
        &self,
        handle: &JobHandle,
        input: &Path,
        work_dir: &Path,
    ) -> Result<PipelineOutput, Doc2AudioError> {
        let job = handle.id();
        info!("Job {}: converting {}", job, input.display());

        // ── Step 1: Classify ─────────────────────────────────────────────
        let kind = DocumentKind::detect(input, &self.config)?;

        tokio::fs::create_dir_all(work_dir)
            .await
            .map_err(|e| Doc2AudioError::io(work_dir, e))?;

        // ── Step 2: Extract ──────────────────────────────────────────────
        let text = self.extractors.extract(input, kind).await?;
        let characters = text.chars().count();

        // ── Step 3: Chunk ────────────────────────────────────────────────
        let chunks = chunk_text(&text, self.config.chunk_size);
        drop(text);
        if chunks.is_empty() {
            return Err(Doc2AudioError::NoContent {
                path: input.to_path_buf(),
            });
        }
        let total = chunks.len();
        handle.set_chunk_count(total);
        info!("Job {}: {} chunks of ≤{} chars", job, total, self.config.chunk_size);

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_conversion_start(job, total);
        }

        // ── Step 4: Synthesize, strictly in order ────────────────────────
        let mut outcomes = Vec::with_capacity(total);
        for chunk in chunks {
            let index = chunk.index;
            handle.set_progress(index as f64 / total as f64 * 100.0);
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_chunk_start(job, index, total);
            }

            let outcome = self.synthesize(chunk, work_dir).await?;
            match &outcome {
                ChunkOutcome::Produced(segment) => {
                    debug!("Job {}: chunk {}/{} done", job, index + 1, total);
                    if let Some(ref cb) = self.config.progress_callback {
                        cb.on_chunk_complete(job, index, total, segment.buffer.samples.len());
                    }
                }
                ChunkOutcome::Skipped { reason, .. } => {
                    if let Some(ref cb) = self.config.progress_callback {
                        cb.on_chunk_error(job, index, total, &reason.to_string());
                    }
                    if matches!(reason, ChunkError::EngineUnavailable { .. }) {
                        return Err(self.synthesizer.unavailable_error());
                    }
                    warn!("Job {}: skipping chunk {}: {}", job, index, reason);
                    handle.record_chunk_failure();
                }
            }
            outcomes.push(outcome);
        }

        // ── Step 5: Assemble ─────────────────────────────────────────────
        let dest = work_dir.join(format!(
            "audiobook.{}",
            self.synthesizer.codec().format().extension()
        ));
        let assembler = AudioAssembler::new(Arc::clone(self.synthesizer.codec()));
        let assembled = tokio::task::spawn_blocking(move || assembler.assemble(outcomes, &dest))
            .await
            .map_err(|e| Doc2AudioError::Internal(format!("Assembly task panicked: {e}")))??;

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_conversion_complete(job, total, assembled.segments);
        }

        Ok(PipelineOutput {
            kind,
            characters,
            chunks: total,
            assembled,
        })
    }

    async fn synthesize(
        &self,
        chunk: TextChunk,
        work_dir: &Path,
    ) -> Result<ChunkOutcome, Doc2AudioError> {
        let synthesizer = Arc::clone(&self.synthesizer);
        let dir = work_dir.to_path_buf();
        tokio::task::spawn_blocking(move || synthesizer.synthesize(&chunk, &dir))
            .await
            .map_err(|e| Doc2AudioError::Internal(format!("Synthesis task panicked: {e}")))
    }
}

/// File name component of `path`, for display and download naming.
pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Convert a document (path or URL) to an audio file using the built-in
/// extractors and engines.
///
/// The artifact is produced in a scratch directory next to `output_path`
/// and renamed into place, so a failed run leaves nothing behind.
///
/// # Example
/// ```rust,no_run
/// use edgequake_doc2audio::{convert_to_file, ConversionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let stats = convert_to_file("novel.epub", "novel.mp3", &ConversionConfig::default()).await?;
/// eprintln!("{:.0}s of audio, {} chunks skipped", stats.duration_secs, stats.skipped_chunks);
/// # Ok(())
/// # }
/// ```
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, Doc2AudioError> {
    ConversionPipeline::from_config(config.clone())
        .convert_to_file(input_str.as_ref(), output_path.as_ref())
        .await
}

/// Report a document's kind, text size and chunk count.
///
/// Needs neither a speech engine nor ffmpeg.
pub async fn inspect(input_str: impl AsRef<str>) -> Result<DocumentSummary, Doc2AudioError> {
    summarize(
        input_str.as_ref(),
        &ConversionConfig::default(),
        &Extractors::default(),
    )
    .await
}

async fn summarize(
    input: &str,
    config: &ConversionConfig,
    extractors: &Extractors,
) -> Result<DocumentSummary, Doc2AudioError> {
    let resolved =
        input::resolve_input(input, config.download_timeout_secs, config.max_upload_bytes).await?;
    let path = resolved.path();
    let kind = DocumentKind::detect(path, config)?;
    let text = extractors.extract(path, kind).await?;
    let chunks = chunk_text(&text, config.chunk_size);

    Ok(DocumentSummary {
        path: path.to_path_buf(),
        kind,
        characters: text.chars().count(),
        chunks: chunks.len(),
    })
}
