//! Speech engines: the pluggable text-to-speech backends.
//!
//! An engine turns one chunk of text into a waveform at its native sample
//! rate. The built-in engines wrap command-line synthesizers that can write
//! a WAV file; each call gets its own scoped temporary output file, removed
//! when the call returns whatever the outcome.
//!
//! | Identifier  | Program     | Invocation |
//! |-------------|-------------|------------|
//! | `espeak-ng` | `espeak-ng` | `espeak-ng [-v VOICE] -w OUT -- TEXT` |
//! | `espeak`    | `espeak`    | `espeak [-v VOICE] -w OUT -- TEXT` |
//! | `pico2wave` | `pico2wave` | `pico2wave [--lang=VOICE] -w OUT -- TEXT` |
//! | `festival`  | `text2wave` | `text2wave [-eval (voice_VOICE)] -o OUT` with TEXT on stdin |

use crate::pipeline::audio::AudioBuffer;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from loading or running a speech engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown speech engine '{0}'")]
    Unknown(String),

    #[error("speech engine '{engine}' could not be loaded: {detail}")]
    LoadFailed { engine: String, detail: String },

    #[error("speech engine '{engine}' failed: {detail}")]
    SynthesisFailed { engine: String, detail: String },
}

/// One text-to-speech backend.
pub trait SpeechEngine: Send + Sync {
    /// Identifier the engine was loaded under.
    fn name(&self) -> &str;

    /// Synthesize `text` into mono PCM at the engine's native rate.
    fn synthesize(&self, text: &str) -> Result<AudioBuffer, EngineError>;
}

/// Loads engines by identifier.
///
/// The synthesizer asks the factory for its primary engine and, if that
/// fails, for its fallback, exactly once.
pub trait EngineFactory: Send + Sync {
    fn load(&self, id: &str) -> Result<Arc<dyn SpeechEngine>, EngineError>;
}

/// How a command-line engine receives its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextInput {
    Argument,
    Stdin,
}

/// A command-line synthesizer that writes a WAV file.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    id: String,
    program: PathBuf,
    voice_args: Vec<String>,
    output_flag: &'static str,
    text_input: TextInput,
}

impl CommandEngine {
    /// Resolve a built-in engine identifier, without probing the program.
    pub fn builtin(id: &str, voice: Option<&str>) -> Result<Self, EngineError> {
        let (program, voice_args, output_flag, text_input) = match id {
            "espeak-ng" | "espeak" => (
                id,
                voice.map(|v| vec!["-v".to_string(), v.to_string()]),
                "-w",
                TextInput::Argument,
            ),
            "pico2wave" => (
                "pico2wave",
                voice.map(|v| vec![format!("--lang={v}")]),
                "-w",
                TextInput::Argument,
            ),
            "festival" => (
                "text2wave",
                voice.map(|v| vec!["-eval".to_string(), format!("(voice_{v})")]),
                "-o",
                TextInput::Stdin,
            ),
            other => return Err(EngineError::Unknown(other.to_string())),
        };

        Ok(Self {
            id: id.to_string(),
            program: PathBuf::from(program),
            voice_args: voice_args.unwrap_or_default(),
            output_flag,
            text_input,
        })
    }

    /// Override the executable (e.g. an absolute path).
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Check that the program can be started at all.
    ///
    /// The exit status is ignored: some synthesizers reject `--help` yet
    /// work fine, and a missing binary is what matters here.
    fn probe(&self) -> Result<(), EngineError> {
        Command::new(&self.program)
            .arg("--help")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|_| ())
            .map_err(|e| EngineError::LoadFailed {
                engine: self.id.clone(),
                detail: format!("cannot run '{}': {e}", self.program.display()),
            })
    }

    fn failure(&self, detail: impl Into<String>) -> EngineError {
        EngineError::SynthesisFailed {
            engine: self.id.clone(),
            detail: detail.into(),
        }
    }
}

impl SpeechEngine for CommandEngine {
    fn name(&self) -> &str {
        &self.id
    }

    fn synthesize(&self, text: &str) -> Result<AudioBuffer, EngineError> {
        let out = tempfile::Builder::new()
            .prefix("tts-")
            .suffix(".wav")
            .tempfile()
            .map_err(|e| self.failure(format!("temp file: {e}")))?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.voice_args)
            .arg(self.output_flag)
            .arg(out.path())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        match self.text_input {
            TextInput::Argument => {
                // Text such as "- Item one." must not parse as an option.
                cmd.arg("--").arg(text).stdin(Stdio::null());
            }
            TextInput::Stdin => {
                cmd.stdin(Stdio::piped());
            }
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| self.failure(format!("spawn: {e}")))?;

        if self.text_input == TextInput::Stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(text.as_bytes())
                    .map_err(|e| self.failure(format!("stdin: {e}")))?;
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| self.failure(format!("wait: {e}")))?;
        if !output.status.success() {
            return Err(self.failure(format!(
                "exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let audio = AudioBuffer::read_wav_file(out.path())
            .map_err(|e| self.failure(format!("unreadable WAV output: {e}")))?;
        if audio.is_empty() {
            return Err(self.failure("no samples produced"));
        }

        debug!(
            "{}: {} chars → {} samples @ {} Hz",
            self.id,
            text.len(),
            audio.samples.len(),
            audio.sample_rate
        );
        Ok(audio)
    }
}

/// Factory for the built-in command-line engines.
#[derive(Debug, Clone, Default)]
pub struct CommandEngineFactory {
    voice: Option<String>,
}

impl CommandEngineFactory {
    pub fn new(voice: Option<String>) -> Self {
        Self { voice }
    }
}

impl EngineFactory for CommandEngineFactory {
    fn load(&self, id: &str) -> Result<Arc<dyn SpeechEngine>, EngineError> {
        let engine = CommandEngine::builtin(id, self.voice.as_deref())?;
        engine.probe()?;
        info!("Loaded speech engine '{}' ({})", id, engine.program.display());
        Ok(Arc::new(engine))
    }
}
