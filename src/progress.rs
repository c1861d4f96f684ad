//! Progress-callback trait for per-chunk conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through each chunk. Job status polling
//! ([`crate::JobManager::status`]) and watching ([`crate::JobManager::watch`])
//! work without a callback; the callback is for callers that want per-chunk
//! detail such as which chunk failed and why.
//!
//! # Example
//!
//! ```rust
//! use edgequake_doc2audio::{ConversionProgressCallback, ConversionConfig, JobId};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_chunk_complete(&self, job: JobId, index: usize, total: usize, samples: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("job {job}: chunk {}/{} ({} samples)", index + 1, total, samples);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::job::JobId;
use std::sync::Arc;

/// Called by the conversion pipeline as it processes each chunk.
///
/// One callback is shared by every job of a [`crate::JobManager`], so events
/// from different jobs may arrive concurrently from different threads;
/// within one job they arrive in chunk order. All methods have default no-op
/// implementations.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once the document has been chunked, before synthesis starts.
    fn on_conversion_start(&self, job: JobId, total_chunks: usize) {
        let _ = (job, total_chunks);
    }

    /// Called just before a chunk is handed to the speech engine.
    ///
    /// `index` is 0-based.
    fn on_chunk_start(&self, job: JobId, index: usize, total_chunks: usize) {
        let _ = (job, index, total_chunks);
    }

    /// Called when a chunk produced audio.
    ///
    /// `samples` is the decoded length of the chunk's audio.
    fn on_chunk_complete(&self, job: JobId, index: usize, total_chunks: usize, samples: usize) {
        let _ = (job, index, total_chunks, samples);
    }

    /// Called when a chunk was skipped.
    fn on_chunk_error(&self, job: JobId, index: usize, total_chunks: usize, error: &str) {
        let _ = (job, index, total_chunks, error);
    }

    /// Called once after every chunk has been attempted and the track assembled.
    fn on_conversion_complete(&self, job: JobId, total_chunks: usize, success_count: usize) {
        let _ = (job, total_chunks, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
