//! Audio encoding: lossless WAV → target format, and back.
//!
//! The synthesizer and the assembler only ever hand the codec a finished WAV
//! file, so an implementation is a pair of file-to-file conversions. MP3 goes
//! through an `ffmpeg` subprocess (libmp3lame, VBR quality 0, the best it
//! offers); WAV is a plain copy and needs no external tools.

use crate::config::{ConversionConfig, OutputFormat};
use crate::pipeline::audio::AudioBuffer;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors from encoding or decoding an audio file.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Converts between lossless WAV files and the configured output format.
pub trait AudioCodec: Send + Sync {
    /// The format this codec produces.
    fn format(&self) -> OutputFormat;

    /// Encode the WAV at `wav` into `dest` at the codec's best quality.
    fn encode(&self, wav: &Path, dest: &Path) -> Result<(), CodecError>;

    /// Decode an encoded file back into PCM.
    fn decode(&self, encoded: &Path) -> Result<AudioBuffer, CodecError>;
}

/// Build the codec for `config.output_format`.
pub fn codec_for(config: &ConversionConfig) -> Arc<dyn AudioCodec> {
    match config.output_format {
        OutputFormat::Wav => Arc::new(WavCodec),
        OutputFormat::Mp3 => Arc::new(FfmpegMp3Codec::new(config.ffmpeg_path.clone())),
    }
}

/// Pass-through codec: the artifact is the WAV itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct WavCodec;

impl AudioCodec for WavCodec {
    fn format(&self) -> OutputFormat {
        OutputFormat::Wav
    }

    fn encode(&self, wav: &Path, dest: &Path) -> Result<(), CodecError> {
        std::fs::copy(wav, dest)?;
        Ok(())
    }

    fn decode(&self, encoded: &Path) -> Result<AudioBuffer, CodecError> {
        Ok(AudioBuffer::read_wav_file(encoded)?)
    }
}

/// MP3 through an ffmpeg subprocess.
#[derive(Debug, Clone)]
pub struct FfmpegMp3Codec {
    ffmpeg: PathBuf,
}

impl FfmpegMp3Codec {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    fn run(&self, args: &[&OsStr]) -> Result<(), CodecError> {
        let program = self.ffmpeg.display().to_string();
        let output = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-nostdin", "-y"])
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| CodecError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(CodecError::Failed {
                program,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

impl AudioCodec for FfmpegMp3Codec {
    fn format(&self) -> OutputFormat {
        OutputFormat::Mp3
    }

    fn encode(&self, wav: &Path, dest: &Path) -> Result<(), CodecError> {
        debug!("ffmpeg: {} → {}", wav.display(), dest.display());
        self.run(&[
            OsStr::new("-i"),
            wav.as_os_str(),
            OsStr::new("-codec:a"),
            OsStr::new("libmp3lame"),
            OsStr::new("-q:a"),
            OsStr::new("0"),
            OsStr::new("-f"),
            OsStr::new("mp3"),
            dest.as_os_str(),
        ])
    }

    fn decode(&self, encoded: &Path) -> Result<AudioBuffer, CodecError> {
        // ffmpeg cannot back-patch WAV headers on a pipe, so decode to a file.
        let dir = encoded
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let scratch = tempfile::Builder::new()
            .prefix(".decode-")
            .suffix(".wav")
            .tempfile_in(dir)?;

        self.run(&[
            OsStr::new("-i"),
            encoded.as_os_str(),
            OsStr::new("-ac"),
            OsStr::new("1"),
            OsStr::new("-acodec"),
            OsStr::new("pcm_s16le"),
            OsStr::new("-f"),
            OsStr::new("wav"),
            scratch.path().as_os_str(),
        ])?;

        Ok(AudioBuffer::read_wav_file(scratch.path())?)
    }
}
