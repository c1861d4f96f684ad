//! Per-chunk synthesis with primary/fallback engine selection.
//!
//! ## Chunk flow
//!
//! ```text
//! text ──▶ engine ──▶ intermediate WAV ──▶ codec.encode ──▶ chunk_N.<ext> ──▶ codec.decode ──▶ AudioSegment
//!                     (scoped temp file)                     (removed, best effort)
//! ```
//!
//! Every failure along that path is reported as a [`ChunkOutcome::Skipped`]
//! carrying a [`ChunkError`]; nothing here aborts the job. Whether a skip is
//! fatal is the pipeline's call.

use crate::error::{ChunkError, Doc2AudioError};
use crate::pipeline::audio::AudioSegment;
use crate::pipeline::chunk::TextChunk;
use crate::pipeline::codec::AudioCodec;
use crate::pipeline::engine::{EngineFactory, SpeechEngine};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Result of synthesizing one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    Produced(AudioSegment),
    Skipped { index: usize, reason: ChunkError },
}

impl ChunkOutcome {
    pub fn index(&self) -> usize {
        match self {
            ChunkOutcome::Produced(seg) => seg.index,
            ChunkOutcome::Skipped { index, .. } => *index,
        }
    }

    pub fn is_produced(&self) -> bool {
        matches!(self, ChunkOutcome::Produced(_))
    }

    fn skipped(reason: ChunkError) -> Self {
        ChunkOutcome::Skipped {
            index: reason.index(),
            reason,
        }
    }
}

/// Which engine ended up active after initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineSelection {
    Primary,
    Fallback,
    Unavailable,
}

/// Turns text chunks into decoded audio using one engine picked at startup.
pub struct Synthesizer {
    engine: Option<Arc<dyn SpeechEngine>>,
    selection: EngineSelection,
    primary: String,
    fallback: String,
    load_error: Option<String>,
    codec: Arc<dyn AudioCodec>,
}

impl Synthesizer {
    /// Load `primary`, or `fallback` if that fails.
    ///
    /// Never fails: if neither engine loads the synthesizer is created in an
    /// unusable state and every [`Synthesizer::synthesize`] call reports
    /// [`ChunkError::EngineUnavailable`].
    pub fn initialize(
        factory: &dyn EngineFactory,
        primary: &str,
        fallback: &str,
        codec: Arc<dyn AudioCodec>,
    ) -> Self {
        let (engine, selection, load_error) = match factory.load(primary) {
            Ok(engine) => {
                info!("Successfully initialized primary TTS engine '{}'", primary);
                (Some(engine), EngineSelection::Primary, None)
            }
            Err(primary_err) => {
                error!("Failed to load primary engine: {}", primary_err);
                match factory.load(fallback) {
                    Ok(engine) => {
                        info!("Successfully initialized fallback TTS engine '{}'", fallback);
                        (Some(engine), EngineSelection::Fallback, None)
                    }
                    Err(fallback_err) => {
                        error!("Failed to load fallback engine: {}", fallback_err);
                        (
                            None,
                            EngineSelection::Unavailable,
                            Some(format!("{primary_err}; {fallback_err}")),
                        )
                    }
                }
            }
        };

        Self {
            engine,
            selection,
            primary: primary.to_string(),
            fallback: fallback.to_string(),
            load_error,
            codec,
        }
    }

    pub fn selection(&self) -> EngineSelection {
        self.selection
    }

    pub fn is_available(&self) -> bool {
        self.engine.is_some()
    }

    /// Name of the active engine, if any.
    pub fn engine_name(&self) -> Option<&str> {
        self.engine.as_deref().map(|e| e.name())
    }

    pub fn codec(&self) -> &Arc<dyn AudioCodec> {
        &self.codec
    }

    /// The fatal error a pipeline reports when this synthesizer has no engine.
    pub fn unavailable_error(&self) -> Doc2AudioError {
        Doc2AudioError::EngineUnavailable {
            primary: self.primary.clone(),
            fallback: self.fallback.clone(),
            detail: self
                .load_error
                .clone()
                .unwrap_or_else(|| "TTS system not properly initialized".to_string()),
        }
    }

    /// Synthesize one chunk, using `work_dir` for its transient artifact.
    ///
    /// Blocking: runs the engine and the codec in-process or as
    /// subprocesses. Call from `spawn_blocking`.
    pub fn synthesize(&self, chunk: &TextChunk, work_dir: &Path) -> ChunkOutcome {
        match self.try_synthesize(chunk, work_dir) {
            Ok(segment) => ChunkOutcome::Produced(segment),
            Err(reason) => {
                error!("Error in TTS conversion: {}", reason);
                ChunkOutcome::skipped(reason)
            }
        }
    }

    fn try_synthesize(&self, chunk: &TextChunk, work_dir: &Path) -> Result<AudioSegment, ChunkError> {
        let index = chunk.index;
        let engine = self
            .engine
            .as_ref()
            .ok_or(ChunkError::EngineUnavailable { index })?;

        let audio = engine
            .synthesize(&chunk.content)
            .map_err(|e| ChunkError::SynthesisFailed {
                index,
                detail: e.to_string(),
            })?;

        // Intermediate lossless copy; removed when `wav` drops, on every path.
        let encode_err = |detail: String| ChunkError::EncodeFailed { index, detail };
        let wav = tempfile::Builder::new()
            .prefix(&format!("chunk_{index}-"))
            .suffix(".wav")
            .tempfile_in(work_dir)
            .map_err(|e| encode_err(format!("temp file: {e}")))?;
        audio
            .write_wav_file(wav.path())
            .map_err(|e| encode_err(e.to_string()))?;

        let artifact = work_dir.join(format!("chunk_{index}.{}", self.codec.format().extension()));
        if let Err(e) = self.codec.encode(wav.path(), &artifact) {
            // A failed encoder may still have written part of the file.
            remove_best_effort(&artifact);
            return Err(encode_err(e.to_string()));
        }
        drop(wav);

        let decoded = self.codec.decode(&artifact);
        remove_best_effort(&artifact);
        let buffer = decoded.map_err(|e| ChunkError::DecodeFailed {
            index,
            detail: e.to_string(),
        })?;

        debug!(
            "Chunk {}: {:.2}s of audio via {}",
            index,
            buffer.duration_secs(),
            engine.name()
        );
        Ok(AudioSegment { index, buffer })
    }
}

/// Delete a transient file, logging instead of failing.
fn remove_best_effort(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::audio::AudioBuffer;
    use crate::config::OutputFormat;
    use crate::pipeline::codec::{AudioCodec, CodecError, WavCodec};
    use crate::pipeline::engine::EngineError;
    use std::collections::HashMap;

    struct ToneEngine(&'static str);

    impl SpeechEngine for ToneEngine {
        fn name(&self) -> &str {
            self.0
        }

        fn synthesize(&self, text: &str) -> Result<AudioBuffer, EngineError> {
            if text.contains("FAIL") {
                return Err(EngineError::SynthesisFailed {
                    engine: self.0.into(),
                    detail: "refused".into(),
                });
            }
            Ok(AudioBuffer::new(vec![7; text.len()], 16000))
        }
    }

    struct MapFactory(HashMap<&'static str, Arc<dyn SpeechEngine>>);

    impl EngineFactory for MapFactory {
        fn load(&self, id: &str) -> Result<Arc<dyn SpeechEngine>, EngineError> {
            self.0
                .get(id)
                .cloned()
                .ok_or_else(|| EngineError::Unknown(id.to_string()))
        }
    }

    fn factory(ids: &[&'static str]) -> MapFactory {
        MapFactory(
            ids.iter()
                .map(|&id| (id, Arc::new(ToneEngine(id)) as Arc<dyn SpeechEngine>))
                .collect(),
        )
    }

    fn chunk(index: usize, content: &str) -> TextChunk {
        TextChunk {
            index,
            content: content.to_string(),
        }
    }

    #[test]
    fn primary_is_preferred() {
        let s = Synthesizer::initialize(&factory(&["a", "b"]), "a", "b", Arc::new(WavCodec));
        assert_eq!(s.selection(), EngineSelection::Primary);
        assert_eq!(s.engine_name(), Some("a"));
    }

    #[test]
    fn fallback_used_when_primary_missing() {
        let s = Synthesizer::initialize(&factory(&["b"]), "a", "b", Arc::new(WavCodec));
        assert_eq!(s.selection(), EngineSelection::Fallback);
        assert_eq!(s.engine_name(), Some("b"));
    }

    #[test]
    fn unusable_when_both_missing() {
        let s = Synthesizer::initialize(&factory(&[]), "a", "b", Arc::new(WavCodec));
        assert!(!s.is_available());
        let dir = tempfile::tempdir().unwrap();
        let outcome = s.synthesize(&chunk(0, "Hello."), dir.path());
        assert_eq!(
            outcome,
            ChunkOutcome::Skipped {
                index: 0,
                reason: ChunkError::EngineUnavailable { index: 0 }
            }
        );
        assert!(s.unavailable_error().to_string().contains("'a'"));
    }

    #[test]
    fn produced_chunk_leaves_no_files_behind() {
        let s = Synthesizer::initialize(&factory(&["a"]), "a", "b", Arc::new(WavCodec));
        let dir = tempfile::tempdir().unwrap();
        let outcome = s.synthesize(&chunk(4, "Hello there."), dir.path());
        match outcome {
            ChunkOutcome::Produced(seg) => {
                assert_eq!(seg.index, 4);
                assert_eq!(seg.buffer.samples.len(), "Hello there.".len());
                assert_eq!(seg.buffer.sample_rate, 16000);
            }
            other => panic!("expected audio, got {other:?}"),
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn engine_failure_is_a_skip() {
        let s = Synthesizer::initialize(&factory(&["a"]), "a", "b", Arc::new(WavCodec));
        let dir = tempfile::tempdir().unwrap();
        let outcome = s.synthesize(&chunk(2, "FAIL."), dir.path());
        assert!(!outcome.is_produced());
        assert_eq!(outcome.index(), 2);
        assert!(matches!(
            outcome,
            ChunkOutcome::Skipped {
                reason: ChunkError::SynthesisFailed { .. },
                ..
            }
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn missing_work_dir_is_an_encode_failure() {
        let s = Synthesizer::initialize(&factory(&["a"]), "a", "b", Arc::new(WavCodec));
        let outcome = s.synthesize(&chunk(1, "Hi."), Path::new("/nonexistent/work-dir"));
        assert!(matches!(
            outcome,
            ChunkOutcome::Skipped {
                reason: ChunkError::EncodeFailed { index: 1, .. },
                ..
            }
        ));
    }

    /// Writes half a file, then reports failure, like an encoder killed
    /// mid-write.
    struct TruncatingCodec;

    impl AudioCodec for TruncatingCodec {
        fn format(&self) -> OutputFormat {
            OutputFormat::Mp3
        }

        fn encode(&self, _wav: &Path, dest: &Path) -> Result<(), CodecError> {
            std::fs::write(dest, b"ID3\x04partial")?;
            Err(CodecError::Io(std::io::Error::other("encoder killed")))
        }

        fn decode(&self, _encoded: &Path) -> Result<AudioBuffer, CodecError> {
            unreachable!("decode after failed encode")
        }
    }

    #[test]
    fn failed_encode_removes_partial_chunk_file() {
        let s = Synthesizer::initialize(&factory(&["a"]), "a", "b", Arc::new(TruncatingCodec));
        let dir = tempfile::tempdir().unwrap();
        let outcome = s.synthesize(&chunk(3, "Hello."), dir.path());
        assert!(matches!(
            outcome,
            ChunkOutcome::Skipped {
                reason: ChunkError::EncodeFailed { index: 3, .. },
                ..
            }
        ));
        let leftover: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert!(leftover.is_empty(), "left behind: {leftover:?}");
    }
}
