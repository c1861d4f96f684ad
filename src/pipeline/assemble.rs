//! Ordered concatenation of per-chunk audio into the final track.

use crate::error::Doc2AudioError;
use crate::pipeline::audio::{AudioBuffer, AudioSegment};
use crate::pipeline::codec::AudioCodec;
use crate::pipeline::synth::ChunkOutcome;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// The written track and what went into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledAudio {
    pub path: PathBuf,
    /// Segments that made it into the track.
    pub segments: usize,
    /// Chunks left out after a per-chunk failure.
    pub skipped: usize,
    pub sample_rate: u32,
    pub duration_secs: f64,
}

pub struct AudioAssembler {
    codec: Arc<dyn AudioCodec>,
}

impl AudioAssembler {
    pub fn new(codec: Arc<dyn AudioCodec>) -> Self {
        Self { codec }
    }

    /// Concatenate the produced segments in chunk order and encode once to
    /// `dest`.
    ///
    /// The first segment's sample rate wins; later segments at another rate
    /// are resampled. Nothing is written when no segment survived. Blocking.
    pub fn assemble(
        &self,
        outcomes: Vec<ChunkOutcome>,
        dest: &Path,
    ) -> Result<AssembledAudio, Doc2AudioError> {
        let total = outcomes.len();
        let mut segments: Vec<AudioSegment> = outcomes
            .into_iter()
            .filter_map(|outcome| match outcome {
                ChunkOutcome::Produced(segment) => Some(segment),
                ChunkOutcome::Skipped { .. } => None,
            })
            .collect();
        let skipped = total - segments.len();

        if segments.is_empty() {
            return Err(Doc2AudioError::NoAudioProduced {
                total,
                failed: skipped,
            });
        }
        segments.sort_by_key(|s| s.index);

        let sample_rate = segments[0].buffer.sample_rate;
        let capacity = segments.iter().map(|s| s.buffer.samples.len()).sum();
        let mut track = AudioBuffer::new(Vec::with_capacity(capacity), sample_rate);
        for segment in &segments {
            if segment.buffer.sample_rate != sample_rate {
                warn!(
                    "Chunk {} is {} Hz, resampling to {} Hz",
                    segment.index, segment.buffer.sample_rate, sample_rate
                );
            }
            track.append(&segment.buffer);
        }

        self.write(&track, dest)?;

        let assembled = AssembledAudio {
            path: dest.to_path_buf(),
            segments: segments.len(),
            skipped,
            sample_rate,
            duration_secs: track.duration_secs(),
        };
        info!(
            "Assembled {} segments ({} skipped), {:.1}s → {}",
            assembled.segments,
            assembled.skipped,
            assembled.duration_secs,
            dest.display()
        );
        Ok(assembled)
    }

    /// WAV scratch file → encode to a temporary name → rename into place.
    fn write(&self, track: &AudioBuffer, dest: &Path) -> Result<(), Doc2AudioError> {
        let failed = |detail: String| Doc2AudioError::AssemblyFailed {
            path: dest.to_path_buf(),
            detail,
        };
        let dir = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let wav = tempfile::Builder::new()
            .prefix(".combined-")
            .suffix(".wav")
            .tempfile_in(dir)
            .map_err(|e| Doc2AudioError::io(dir, e))?;
        track
            .write_wav_file(wav.path())
            .map_err(|e| failed(e.to_string()))?;

        let partial = dest.with_extension(format!("{}.tmp", self.codec.format().extension()));
        if let Err(e) = self.codec.encode(wav.path(), &partial) {
            let _ = std::fs::remove_file(&partial);
            return Err(failed(e.to_string()));
        }

        std::fs::rename(&partial, dest).map_err(|e| {
            let _ = std::fs::remove_file(&partial);
            Doc2AudioError::io(dest, e)
        })
    }
}
