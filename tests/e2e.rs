//! End-to-end tests for edgequake-doc2audio.
//!
//! Most tests drive a real `JobManager` through the whole pipeline with an
//! in-process speech engine and a stub text extractor, writing WAV output so
//! neither ffmpeg nor pdfium is needed.
//!
//! The tests at the bottom use the real command-line engines and pdfium on
//! files in `./test_cases/`. They are gated behind `E2E_ENABLED`:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture

use edgequake_doc2audio::pipeline::audio::AudioBuffer;
use edgequake_doc2audio::pipeline::codec::WavCodec;
use edgequake_doc2audio::pipeline::engine::EngineError;
use edgequake_doc2audio::{
    ConversionConfig, ConversionJob, ConversionPipeline, ConversionProgressCallback,
    Doc2AudioError, EngineFactory, Extractors, JobId, JobManager, JobStatus, OutputFormat,
    SpeechEngine, Synthesizer, TextExtractor,
};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ── Test doubles ─────────────────────────────────────────────────────────────

const SAMPLES_PER_CHUNK: usize = 160;

/// Speaks each chunk as a flat tone whose level is the chunk's first
/// character, so the assembled track shows which chunks made it in and in
/// what order. Text containing `FAIL` is refused.
struct ToneEngine {
    delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ToneEngine {
    fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }
}

impl SpeechEngine for ToneEngine {
    fn name(&self) -> &str {
        "tone"
    }

    fn synthesize(&self, text: &str) -> Result<AudioBuffer, EngineError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if text.contains("FAIL") {
            return Err(EngineError::SynthesisFailed {
                engine: "tone".into(),
                detail: "refused".into(),
            });
        }
        let level = text.chars().next().map_or(0, |c| c as i16);
        Ok(AudioBuffer::new(vec![level; SAMPLES_PER_CHUNK], 16_000))
    }
}

/// Hands out one engine under the id `tone`; every other id fails to load.
struct SingleFactory(Option<Arc<ToneEngine>>);

impl EngineFactory for SingleFactory {
    fn load(&self, id: &str) -> Result<Arc<dyn SpeechEngine>, EngineError> {
        match (&self.0, id) {
            (Some(engine), "tone") => Ok(Arc::clone(engine) as Arc<dyn SpeechEngine>),
            _ => Err(EngineError::LoadFailed {
                engine: id.to_string(),
                detail: "not installed".into(),
            }),
        }
    }
}

/// Returns fixed text for any document.
struct FixedText(&'static str);

impl TextExtractor for FixedText {
    fn extract(&self, _path: &Path) -> Result<String, Doc2AudioError> {
        Ok(self.0.to_string())
    }
}

#[derive(Default)]
struct RecordingCallback {
    events: Mutex<Vec<String>>,
}

impl RecordingCallback {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl ConversionProgressCallback for RecordingCallback {
    fn on_conversion_start(&self, _job: JobId, total: usize) {
        self.push(format!("start {total}"));
    }

    fn on_chunk_complete(&self, _job: JobId, index: usize, _total: usize, samples: usize) {
        self.push(format!("ok {index} {samples}"));
    }

    fn on_chunk_error(&self, _job: JobId, index: usize, _total: usize, _error: &str) {
        self.push(format!("err {index}"));
    }

    fn on_conversion_complete(&self, _job: JobId, total: usize, produced: usize) {
        self.push(format!("done {produced}/{total}"));
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

/// Five one-sentence chunks at `chunk_size(5)`; the third is refused.
const FIVE_WITH_FAILURE: &str = "Alpha. Bravo. Charlie FAIL. Delta. Echo.";
const FIVE_CLEAN: &str = "Alpha. Bravo. Charlie. Delta. Echo.";

struct Harness {
    dir: TempDir,
    manager: JobManager,
}

struct HarnessBuilder {
    text: &'static str,
    engine: Option<Arc<ToneEngine>>,
    max_jobs: usize,
    max_upload: usize,
    callback: Option<Arc<RecordingCallback>>,
}

impl HarnessBuilder {
    fn new(text: &'static str) -> Self {
        Self {
            text,
            engine: Some(ToneEngine::new()),
            max_jobs: 4,
            max_upload: 1024,
            callback: None,
        }
    }

    fn engine(mut self, engine: Option<Arc<ToneEngine>>) -> Self {
        self.engine = engine;
        self
    }

    fn max_jobs(mut self, n: usize) -> Self {
        self.max_jobs = n;
        self
    }

    fn callback(mut self, cb: Arc<RecordingCallback>) -> Self {
        self.callback = Some(cb);
        self
    }

    fn build(self) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = ConversionConfig::builder()
            .chunk_size(5)
            .primary_engine("tone")
            .fallback_engine("also-missing")
            .output_format(OutputFormat::Wav)
            .max_concurrent_jobs(self.max_jobs)
            .max_upload_bytes(self.max_upload)
            .upload_dir(dir.path().join("uploads"))
            .output_dir(dir.path().join("audiobooks"));
        if let Some(cb) = self.callback {
            builder = builder.progress_callback(cb as Arc<dyn ConversionProgressCallback>);
        }
        let config = builder.build().unwrap();

        let factory = SingleFactory(self.engine);
        let synthesizer = Synthesizer::initialize(&factory, "tone", "also-missing", Arc::new(WavCodec));
        let extractors = Extractors::default()
            .with_pdf(Arc::new(FixedText(self.text)))
            .with_epub(Arc::new(FixedText(self.text)));
        let pipeline = ConversionPipeline::new(config, extractors, Arc::new(synthesizer));

        Harness {
            dir,
            manager: JobManager::with_pipeline(pipeline),
        }
    }
}

impl Harness {
    /// Write a placeholder document and submit it by path.
    async fn submit_file(&self, name: &str) -> JobId {
        let path = self.dir.path().join(name);
        std::fs::write(&path, b"%PDF-1.7 placeholder").unwrap();
        self.manager.submit(path).await
    }

    async fn finish(&self, id: JobId) -> ConversionJob {
        tokio::time::timeout(Duration::from_secs(10), self.manager.wait(id))
            .await
            .expect("job did not finish in time")
            .unwrap()
    }
}

fn levels(path: &Path) -> Vec<i16> {
    let audio = AudioBuffer::read_wav_file(path).unwrap();
    let mut runs: Vec<i16> = Vec::new();
    for s in audio.samples {
        if runs.last() != Some(&s) {
            runs.push(s);
        }
    }
    runs
}

// ── Conversion ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_chunk_is_left_out_and_job_completes() {
    let h = HarnessBuilder::new(FIVE_WITH_FAILURE).build();
    let id = h.submit_file("book.pdf").await;
    let job = h.finish(id).await;

    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
    assert_eq!(job.progress, 100.0);
    assert_eq!(job.chunk_count, 5);
    assert_eq!(job.failed_chunks, 1);
    assert!(job.error.is_none());

    let output = job.output_path.expect("completed job has an output path");
    assert_eq!(output, h.dir.path().join("audiobooks").join(id.to_string()).join("audiobook.wav"));
    assert_eq!(
        levels(&output),
        vec!['A' as i16, 'B' as i16, 'D' as i16, 'E' as i16]
    );
    let audio = AudioBuffer::read_wav_file(&output).unwrap();
    assert_eq!(audio.samples.len(), 4 * SAMPLES_PER_CHUNK);
}

#[tokio::test]
async fn no_engine_fails_the_job_without_progress() {
    let h = HarnessBuilder::new(FIVE_CLEAN).engine(None).build();
    let id = h.submit_file("book.pdf").await;
    let job = h.finish(id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.progress, 0.0);
    assert!(job.output_path.is_none());
    let error = job.error.unwrap();
    assert!(error.contains("engine"), "unexpected error: {error}");
}

#[tokio::test]
async fn unsupported_extension_fails_before_chunking() {
    let h = HarnessBuilder::new(FIVE_CLEAN).build();
    let id = h.submit_file("notes.txt").await;
    let job = h.finish(id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.chunk_count, 0);
    assert!(job.error.unwrap().contains("Unsupported"));
}

#[tokio::test]
async fn empty_text_fails_with_no_content() {
    let h = HarnessBuilder::new("  \n ... \n").build();
    let id = h.submit_file("blank.epub").await;
    let job = h.finish(id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().contains("No valid text chunks"));
}

#[tokio::test]
async fn all_chunks_failing_fails_the_job() {
    let h = HarnessBuilder::new("One FAIL. Two FAIL.").build();
    let id = h.submit_file("book.pdf").await;
    let job = h.finish(id).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.failed_chunks, 2);
    assert!(job.progress < 100.0);
    assert!(job.error.unwrap().contains("No audio segments"));
}

#[tokio::test]
async fn progress_is_monotone_and_reaches_100_only_on_completion() {
    let h = HarnessBuilder::new(FIVE_CLEAN)
        .engine(Some(ToneEngine::with_delay(Duration::from_millis(10))))
        .build();
    let id = h.submit_file("book.epub").await;

    let snapshots: Vec<ConversionJob> = h.manager.watch(id).await.unwrap().collect().await;
    assert!(!snapshots.is_empty());
    for pair in snapshots.windows(2) {
        assert!(pair[0].progress <= pair[1].progress, "progress went backwards");
    }
    for snap in &snapshots {
        if snap.progress >= 100.0 {
            assert_eq!(snap.status, JobStatus::Completed);
        }
    }
    let last = snapshots.last().unwrap();
    assert_eq!(last.status, JobStatus::Completed);
    assert_eq!(last.progress, 100.0);
}

#[tokio::test]
async fn progress_callback_sees_every_chunk() {
    let cb = Arc::new(RecordingCallback::default());
    let h = HarnessBuilder::new(FIVE_WITH_FAILURE)
        .callback(Arc::clone(&cb))
        .build();
    let id = h.submit_file("book.pdf").await;
    h.finish(id).await;

    let n = SAMPLES_PER_CHUNK;
    assert_eq!(
        cb.events(),
        vec![
            "start 5".to_string(),
            format!("ok 0 {n}"),
            format!("ok 1 {n}"),
            "err 2".to_string(),
            format!("ok 3 {n}"),
            format!("ok 4 {n}"),
            "done 4/5".to_string(),
        ]
    );
}

#[tokio::test]
async fn concurrent_jobs_respect_the_cap() {
    let engine = ToneEngine::with_delay(Duration::from_millis(20));
    let h = HarnessBuilder::new(FIVE_CLEAN)
        .engine(Some(Arc::clone(&engine)))
        .max_jobs(1)
        .build();

    let mut ids = Vec::new();
    for name in ["a.pdf", "b.pdf", "c.pdf"] {
        ids.push(h.submit_file(name).await);
    }
    for id in ids {
        assert_eq!(h.finish(id).await.status, JobStatus::Completed);
    }
    assert_eq!(engine.peak.load(Ordering::SeqCst), 1);
}

// ── Queries ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_job_is_not_found_everywhere() {
    let h = HarnessBuilder::new(FIVE_CLEAN).build();
    let ghost = JobId::from_raw(999);

    assert!(matches!(h.manager.status(ghost).await, Err(Doc2AudioError::NotFound(_))));
    assert!(matches!(h.manager.result(ghost).await, Err(Doc2AudioError::NotFound(_))));
    assert!(matches!(h.manager.download(ghost).await, Err(Doc2AudioError::NotFound(_))));
    assert!(matches!(h.manager.watch(ghost).await, Err(Doc2AudioError::NotFound(_))));
    assert!(matches!(h.manager.wait(ghost).await, Err(Doc2AudioError::NotFound(_))));
}

#[tokio::test]
async fn failed_job_has_no_result() {
    let h = HarnessBuilder::new(FIVE_CLEAN).engine(None).build();
    let id = h.submit_file("book.pdf").await;
    h.finish(id).await;

    match h.manager.result(id).await {
        Err(Doc2AudioError::NotCompleted { status, .. }) => assert_eq!(status, "failed"),
        other => panic!("expected NotCompleted, got {other:?}"),
    }
}

#[tokio::test]
async fn deleted_artifact_is_reported_missing() {
    let h = HarnessBuilder::new(FIVE_CLEAN).build();
    let id = h.submit_file("book.pdf").await;
    let job = h.finish(id).await;

    let (artifact, _file) = h.manager.download(id).await.unwrap();
    assert_eq!(artifact.download_name, "book.wav");
    assert_eq!(Some(&artifact.path), job.output_path.as_ref());

    std::fs::remove_file(&artifact.path).unwrap();
    assert!(matches!(
        h.manager.result(id).await,
        Err(Doc2AudioError::ArtifactMissing { .. })
    ));
    assert!(matches!(
        h.manager.download(id).await,
        Err(Doc2AudioError::ArtifactMissing { .. })
    ));
}

#[tokio::test]
async fn jobs_are_listed_in_submission_order() {
    let h = HarnessBuilder::new(FIVE_CLEAN).build();
    let first = h.submit_file("one.pdf").await;
    let second = h.submit_file("two.epub").await;
    assert!(first < second);
    assert_eq!(first, JobId::from_raw(1));

    let listed: Vec<JobId> = h.manager.jobs().await.into_iter().map(|j| j.id).collect();
    assert_eq!(listed, vec![first, second]);
}

// ── Uploads ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn upload_is_stored_under_its_id_and_converted() {
    let h = HarnessBuilder::new(FIVE_CLEAN).build();
    let id = h
        .manager
        .submit_upload(b"%PDF-1.7 tiny", "My Novel.pdf")
        .await
        .unwrap();

    let stored: PathBuf = h.dir.path().join("uploads").join(format!("{id}-My_Novel.pdf"));
    assert!(stored.is_file());

    let job = h.finish(id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.input_path, stored);
    assert_eq!(h.manager.result(id).await.unwrap().download_name, "My_Novel.wav");
}

#[tokio::test]
async fn upload_validation_rejects_bad_requests() {
    let h = HarnessBuilder::new(FIVE_CLEAN).build();

    assert!(matches!(
        h.manager.submit_upload(b"", "book.pdf").await,
        Err(Doc2AudioError::InvalidUpload { .. })
    ));
    assert!(matches!(
        h.manager.submit_upload(vec![0u8; 2048], "book.pdf").await,
        Err(Doc2AudioError::UploadTooLarge { size: 2048, limit: 1024 })
    ));
    assert!(matches!(
        h.manager.submit_upload(b"data", "../..").await,
        Err(Doc2AudioError::InvalidUpload { .. })
    ));
    assert!(h.manager.jobs().await.is_empty());
}

// ── Real engines (gated) ─────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip unless E2E_ENABLED is set and the document exists.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP: test file not found: {}", p.display());
            return;
        }
        p
    }};
}

#[tokio::test]
async fn e2e_inspect_pdf() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("sample.pdf"));
    let summary = edgequake_doc2audio::inspect(path.to_str().unwrap()).await.unwrap();
    println!("{summary:?}");
    assert!(summary.characters > 0);
    assert!(summary.chunks > 0);
}

#[tokio::test]
async fn e2e_convert_epub_to_wav() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("sample.epub"));
    let out = tempfile::tempdir().unwrap();
    let config = ConversionConfig::builder()
        .output_format(OutputFormat::Wav)
        .build()
        .unwrap();
    let stats = edgequake_doc2audio::convert_to_file(
        path.to_str().unwrap(),
        out.path().join("sample.wav"),
        &config,
    )
    .await
    .unwrap();
    println!("{stats:?}");
    assert!(stats.duration_secs > 0.0);
    assert!(stats.output_path.is_file());
}
