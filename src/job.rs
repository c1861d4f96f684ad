//! Job records and the single-writer handle a pipeline uses to update them.
//!
//! A job's state lives in a `tokio::sync::watch` channel. The
//! [`crate::JobManager`] keeps the receiving side in its registry and serves
//! snapshots from it; the sending side is wrapped in a [`JobHandle`] that is
//! moved into the job's pipeline task. Only the holder of the handle can
//! change the record, and terminal states are enforced here rather than by
//! convention at each call site.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Process-unique job identifier, allocated from an atomic counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    pub fn from_raw(raw: u64) -> Self {
        JobId(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(JobId)
    }
}

/// Lifecycle state of a conversion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// `Completed` and `Failed` never transition further.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        })
    }
}

/// Snapshot of one conversion job.
///
/// Exactly one of `output_path` and `error` is set once `status` is
/// terminal; `progress` is 100 exactly when `status` is `Completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionJob {
    pub id: JobId,
    pub input_path: PathBuf,
    /// File name the document was submitted under (the declared name for
    /// uploads); the download name is derived from it.
    pub source_name: String,
    pub status: JobStatus,
    /// Percentage in `[0, 100]`.
    pub progress: f64,
    /// Final artifact, set on completion.
    pub output_path: Option<PathBuf>,
    /// Human-readable failure, set on failure.
    pub error: Option<String>,
    /// Number of chunks the document was split into (0 until known).
    pub chunk_count: usize,
    /// Chunks skipped after a synthesis failure.
    pub failed_chunks: usize,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl ConversionJob {
    pub(crate) fn new(
        id: JobId,
        input_path: impl Into<PathBuf>,
        source_name: impl Into<String>,
    ) -> Self {
        let now = current_timestamp_ms();
        Self {
            id,
            input_path: input_path.into(),
            source_name: source_name.into(),
            status: JobStatus::Processing,
            progress: 0.0,
            output_path: None,
            error: None,
            chunk_count: 0,
            failed_chunks: 0,
            created_at_ms: now,
            updated_at_ms: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Exclusive write access to one job's record.
///
/// Dropping a handle while its job is still processing (a panic unwinding
/// through the pipeline, an aborted task) fails the job, so a record can
/// never be stranded in `processing`.
pub struct JobHandle {
    tx: watch::Sender<ConversionJob>,
}

impl JobHandle {
    /// Create a handle for a fresh record along with its first reader.
    pub(crate) fn new(job: ConversionJob) -> (Self, watch::Receiver<ConversionJob>) {
        let (tx, rx) = watch::channel(job);
        (Self { tx }, rx)
    }

    pub fn id(&self) -> JobId {
        self.tx.borrow().id
    }

    pub fn snapshot(&self) -> ConversionJob {
        self.tx.borrow().clone()
    }

    /// Raise progress to `percent`.
    ///
    /// Lower values are ignored (progress never goes backwards) and values of
    /// 100 or more are ignored too: only [`JobHandle::complete`] reaches 100.
    pub fn set_progress(&self, percent: f64) {
        if !percent.is_finite() || percent >= 100.0 {
            return;
        }
        let percent = percent.max(0.0);
        self.tx.send_if_modified(|job| {
            if job.is_terminal() || percent <= job.progress {
                return false;
            }
            job.progress = percent;
            job.updated_at_ms = current_timestamp_ms();
            true
        });
    }

    pub fn set_chunk_count(&self, count: usize) {
        self.tx.send_if_modified(|job| {
            if job.is_terminal() {
                return false;
            }
            job.chunk_count = count;
            job.updated_at_ms = current_timestamp_ms();
            true
        });
    }

    pub fn record_chunk_failure(&self) {
        self.tx.send_if_modified(|job| {
            if job.is_terminal() {
                return false;
            }
            job.failed_chunks += 1;
            job.updated_at_ms = current_timestamp_ms();
            true
        });
    }

    /// Mark the job completed with its artifact.
    pub fn complete(self, output_path: &Path) {
        let output_path = output_path.to_path_buf();
        self.tx.send_if_modified(|job| {
            if job.is_terminal() {
                return false;
            }
            job.status = JobStatus::Completed;
            job.progress = 100.0;
            job.output_path = Some(output_path);
            job.error = None;
            job.updated_at_ms = current_timestamp_ms();
            true
        });
        info!("Job {} completed", self.id());
    }

    /// Mark the job failed; progress keeps its last value.
    pub fn fail(self, message: impl Into<String>) {
        self.mark_failed(message.into());
    }

    fn mark_failed(&self, message: String) {
        let id = self.id();
        let changed = self.tx.send_if_modified(|job| {
            if job.is_terminal() {
                return false;
            }
            job.status = JobStatus::Failed;
            job.output_path = None;
            job.error = Some(message.clone());
            job.updated_at_ms = current_timestamp_ms();
            true
        });
        if changed {
            error!("Job {} failed: {}", id, message);
        }
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        if !self.tx.borrow().is_terminal() {
            debug!("Job handle dropped mid-conversion");
            self.mark_failed("Conversion aborted before completion".to_string());
        }
    }
}

pub(crate) fn current_timestamp_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
