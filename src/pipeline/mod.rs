//! Pipeline stages for document-to-audio conversion.
//!
//! Each submodule implements one transformation step and can be tested on
//! its own; the orchestration lives in [`crate::convert`].
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ chunk ──▶ synth ──────────────▶ assemble
//! (URL/path) (pdf/epub)  (sentences) (engine + codec,     (concat + encode
//!                                     per chunk)           once)
//! ```
//!
//! 1. [`input`]    resolve a local path or download a URL
//! 2. [`extract`]  document → plain text, blocking pool
//! 3. [`chunk`]    text → bounded, sentence-respecting chunks
//! 4. [`synth`]    chunk → [`synth::ChunkOutcome`] via a [`engine::SpeechEngine`]
//!    and an [`codec::AudioCodec`] round trip
//! 5. [`assemble`] ordered segments → one encoded file
//!
//! [`audio`] holds the PCM buffer type shared by the last three stages.

pub mod assemble;
pub mod audio;
pub mod chunk;
pub mod codec;
pub mod engine;
pub mod extract;
pub mod input;
pub mod synth;
