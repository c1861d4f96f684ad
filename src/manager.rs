//! Job registry and scheduler.
//!
//! ## Concurrency model
//!
//! ```text
//! submit ──▶ allocate id ──▶ register watch::Receiver ──▶ spawn task ──▶ return id
//!                                                           │
//!                                      acquire semaphore permit (stays at 0%)
//!                                                           │
//!                                      ConversionPipeline::run(JobHandle, …)
//! ```
//!
//! The registry maps each id to the receiving end of the job's watch
//! channel, so status queries never wait on a running pipeline. Admission
//! is bounded by `max_concurrent_jobs`; everything else runs freely on the
//! tokio runtime.

use crate::config::ConversionConfig;
use crate::convert::{display_name, ConversionPipeline};
use crate::error::Doc2AudioError;
use crate::job::{ConversionJob, JobHandle, JobId, JobStatus};
use crate::pipeline::input;
use crate::stream::JobStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, RwLock, Semaphore};
use tracing::{debug, info, warn};

/// Where a finished job's audio lives and what to call it when served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub path: PathBuf,
    /// `{source stem}.{ext}`, e.g. `novel.mp3` for `novel.epub`.
    pub download_name: String,
}

/// Accepts documents, runs their conversions in the background and answers
/// status and download queries.
///
/// Cloning is cheap and every clone sees the same jobs.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<Inner>,
}

struct Inner {
    pipeline: ConversionPipeline,
    jobs: RwLock<HashMap<JobId, watch::Receiver<ConversionJob>>>,
    next_id: AtomicU64,
    permits: Arc<Semaphore>,
}

impl JobManager {
    /// Manager using the built-in extractors and command-line engines.
    ///
    /// Engines are probed once, here; every job shares the result.
    pub fn new(config: ConversionConfig) -> Self {
        Self::with_pipeline(ConversionPipeline::from_config(config))
    }

    /// Manager around an existing pipeline.
    ///
    /// `max_concurrent_jobs` is clamped to `1..=Semaphore::MAX_PERMITS`, also
    /// for configs that never went through `build()`.
    pub fn with_pipeline(pipeline: ConversionPipeline) -> Self {
        let requested = pipeline.config().max_concurrent_jobs;
        let cap = requested.clamp(1, Semaphore::MAX_PERMITS);
        if cap != requested {
            warn!("max_concurrent_jobs {} out of range, using {}", requested, cap);
        }
        let permits = Arc::new(Semaphore::new(cap));
        Self {
            inner: Arc::new(Inner {
                pipeline,
                jobs: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                permits,
            }),
        }
    }

    pub fn config(&self) -> &ConversionConfig {
        self.inner.pipeline.config()
    }

    pub fn pipeline(&self) -> &ConversionPipeline {
        &self.inner.pipeline
    }

    /// Queue an on-disk document for conversion and return at once.
    pub async fn submit(&self, document: impl Into<PathBuf>) -> JobId {
        let document = document.into();
        let id = self.allocate_id();
        let source_name = display_name(&document);
        self.register_and_spawn(id, document, source_name).await;
        id
    }

    /// Validate and store uploaded bytes, then queue them.
    ///
    /// The file lands at `upload_dir/{id}-{sanitized name}`. The extension
    /// is not checked here; an unsupported document fails its job.
    pub async fn submit_upload(
        &self,
        bytes: impl AsRef<[u8]>,
        declared_filename: &str,
    ) -> Result<JobId, Doc2AudioError> {
        let bytes = bytes.as_ref();
        let config = self.config();

        if bytes.is_empty() {
            return Err(Doc2AudioError::InvalidUpload {
                reason: "No file content".to_string(),
            });
        }
        if bytes.len() > config.max_upload_bytes {
            return Err(Doc2AudioError::UploadTooLarge {
                size: bytes.len(),
                limit: config.max_upload_bytes,
            });
        }
        let sanitized = sanitize_filename(declared_filename).ok_or_else(|| {
            Doc2AudioError::InvalidUpload {
                reason: format!("Unusable filename '{declared_filename}'"),
            }
        })?;

        tokio::fs::create_dir_all(&config.upload_dir)
            .await
            .map_err(|e| Doc2AudioError::io(&config.upload_dir, e))?;

        let id = self.allocate_id();
        let stored = config.upload_dir.join(format!("{id}-{sanitized}"));
        tokio::fs::write(&stored, bytes)
            .await
            .map_err(|e| Doc2AudioError::io(&stored, e))?;
        debug!(
            "Stored upload '{}' ({} bytes) at {}",
            sanitized,
            bytes.len(),
            stored.display()
        );

        self.register_and_spawn(id, stored, sanitized).await;
        Ok(id)
    }

    /// Download an HTTP(S) document and queue it as an upload.
    pub async fn submit_url(&self, url: &str) -> Result<JobId, Doc2AudioError> {
        let config = self.config();
        let fetched =
            input::fetch_url(url, config.download_timeout_secs, config.max_upload_bytes).await?;
        self.submit_upload(&fetched.bytes, &fetched.filename).await
    }

    /// Current snapshot of a job.
    pub async fn status(&self, id: JobId) -> Result<ConversionJob, Doc2AudioError> {
        let jobs = self.inner.jobs.read().await;
        let rx = jobs.get(&id).ok_or(Doc2AudioError::NotFound(id))?;
        let job = rx.borrow().clone();
        Ok(job)
    }

    /// Snapshots of every job, oldest first.
    pub async fn jobs(&self) -> Vec<ConversionJob> {
        let jobs = self.inner.jobs.read().await;
        let mut all: Vec<ConversionJob> = jobs.values().map(|rx| rx.borrow().clone()).collect();
        all.sort_by_key(|job| job.id);
        all
    }

    /// The artifact of a completed job.
    pub async fn result(&self, id: JobId) -> Result<ArtifactRef, Doc2AudioError> {
        let job = self.status(id).await?;
        let path = match (job.status, job.output_path) {
            (JobStatus::Completed, Some(path)) => path,
            (status, _) => {
                return Err(Doc2AudioError::NotCompleted {
                    id,
                    status: status.to_string(),
                })
            }
        };

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(Doc2AudioError::ArtifactMissing { id, path });
        }

        let download_name = download_name(&job.source_name, &path);
        Ok(ArtifactRef {
            path,
            download_name,
        })
    }

    /// The artifact of a completed job, opened for reading.
    pub async fn download(
        &self,
        id: JobId,
    ) -> Result<(ArtifactRef, tokio::fs::File), Doc2AudioError> {
        let artifact = self.result(id).await?;
        match tokio::fs::File::open(&artifact.path).await {
            Ok(file) => Ok((artifact, file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Doc2AudioError::ArtifactMissing {
                    id,
                    path: artifact.path,
                })
            }
            Err(e) => Err(Doc2AudioError::io(&artifact.path, e)),
        }
    }

    /// Follow a job's progress until it finishes.
    pub async fn watch(&self, id: JobId) -> Result<JobStream, Doc2AudioError> {
        let jobs = self.inner.jobs.read().await;
        let rx = jobs.get(&id).ok_or(Doc2AudioError::NotFound(id))?;
        Ok(JobStream::new(rx.clone()))
    }

    /// Wait for a job to reach `completed` or `failed`.
    pub async fn wait(&self, id: JobId) -> Result<ConversionJob, Doc2AudioError> {
        let mut rx = {
            let jobs = self.inner.jobs.read().await;
            jobs.get(&id).ok_or(Doc2AudioError::NotFound(id))?.clone()
        };
        let reached = rx
            .wait_for(ConversionJob::is_terminal)
            .await
            .map(|job| job.clone());
        // Sender gone: the handle's drop already settled the record.
        Ok(reached.unwrap_or_else(|_| rx.borrow().clone()))
    }

    fn allocate_id(&self) -> JobId {
        JobId::from_raw(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    async fn register_and_spawn(&self, id: JobId, document: PathBuf, source_name: String) {
        let (handle, rx) = JobHandle::new(ConversionJob::new(id, &document, source_name));
        {
            let mut jobs = self.inner.jobs.write().await;
            if jobs.contains_key(&id) {
                // Ids come from a counter; a clash means the registry was
                // seeded some other way.
                warn!("Job id {} already registered, replacing", id);
            }
            jobs.insert(id, rx);
        }
        info!("Job {} queued: {}", id, document.display());

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let _permit = match Arc::clone(&inner.permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    handle.fail("Job scheduler shut down");
                    return;
                }
            };
            let work_dir = inner.pipeline.config().output_dir.join(id.to_string());
            inner.pipeline.run(handle, &document, &work_dir).await;
        });
    }
}

/// Reduce a client-supplied file name to a safe single path component.
///
/// Keeps ASCII alphanumerics, `.`, `-` and `_`; whitespace becomes `_`;
/// anything else is dropped, as are leading dots. Only the last `/` or `\`
/// separated component is considered. `None` if nothing usable remains.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = last
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    let has_stem = cleaned.chars().any(|c| c.is_ascii_alphanumeric());
    has_stem.then(|| cleaned.to_string())
}

fn download_name(source_name: &str, artifact: &Path) -> String {
    let stem = Path::new(source_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "audiobook".to_string());
    match artifact.extension() {
        Some(ext) => format!("{}.{}", stem, ext.to_string_lossy()),
        None => stem,
    }
}
