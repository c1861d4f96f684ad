//! CLI binary for edgequake-doc2audio.
//!
//! A thin shim over the library crate: maps CLI flags to `ConversionConfig`,
//! submits one document to a `JobManager`, renders its progress and copies
//! the finished audio to the requested path.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_doc2audio::pipeline::input::is_url;
use edgequake_doc2audio::{
    ConversionConfig, ConversionPipeline, ConversionProgressCallback, JobId, JobManager,
    JobStatus, OutputFormat, ProgressCallback,
};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress reporting ───────────────────────────────────────────────────

/// Per-chunk log lines above the bar. The bar position itself follows the
/// job's watch stream.
struct CliProgressCallback {
    bar: ProgressBar,
    failed: AtomicUsize,
}

impl CliProgressCallback {
    fn new(bar: ProgressBar) -> Arc<Self> {
        Arc::new(Self {
            bar,
            failed: AtomicUsize::new(0),
        })
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, _job: JobId, total_chunks: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  \
             ⏱ {elapsed_precise}  ETA {eta_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_style(style);
        self.bar.set_prefix("Speaking");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Synthesizing {total_chunks} chunks…"))
        ));
    }

    fn on_chunk_start(&self, _job: JobId, index: usize, total_chunks: usize) {
        self.bar.set_message(format!("chunk {}/{}", index + 1, total_chunks));
    }

    fn on_chunk_error(&self, _job: JobId, index: usize, total_chunks: usize, error: &str) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(['\u{2026}']).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Chunk {:>4}/{:<4}  {}",
            red("✗"),
            index + 1,
            total_chunks,
            red(&msg)
        ));
    }
}

fn spinner() -> ProgressBar {
    let bar = ProgressBar::new(100);
    let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICKS);
    bar.set_style(style);
    bar.set_prefix("Preparing");
    bar.set_message("Extracting text…");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert an EPUB to MP3 next to the current directory
  doc2audio novel.epub

  # Choose the output file and format
  doc2audio report.pdf -o report.wav --format wav

  # Another engine and voice
  doc2audio --engine pico2wave --voice en-GB paper.pdf

  # Convert from URL
  doc2audio https://example.com/books/alice.epub -o alice.mp3

  # Text size and chunk count only (no speech engine needed)
  doc2audio --inspect-only book.pdf

  # Machine-readable result
  doc2audio --json book.epub > result.json

ENGINES:
  espeak-ng   (default primary)
  espeak      (default fallback)
  pico2wave   SVOX Pico; --voice is a language tag such as en-US
  festival    via text2wave; --voice is a festival voice name

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH   Path to libpdfium (file or directory); else ./ then system
  RUST_LOG          Overrides the log filter (e.g. edgequake_doc2audio=debug)
"#;

/// Convert PDF and EPUB documents to spoken audio.
#[derive(Parser, Debug)]
#[command(
    name = "doc2audio",
    version,
    about = "Convert PDF and EPUB documents to spoken audio",
    long_about = "Convert PDF and EPUB documents (local files or URLs) into a single audio \
file. Text is split into sentence-respecting chunks, each chunk is spoken by a local \
text-to-speech engine, and the pieces are joined in order.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF/EPUB file path or HTTP/HTTPS URL.
    input: String,

    /// Write audio to this file (default: <input stem>.<format> in the current directory).
    #[arg(short, long, env = "DOC2AUDIO_OUTPUT")]
    output: Option<PathBuf>,

    /// Output encoding.
    #[arg(long, env = "DOC2AUDIO_FORMAT", value_enum, default_value = "mp3")]
    format: FormatArg,

    /// Maximum characters per synthesized chunk.
    #[arg(long, env = "DOC2AUDIO_CHUNK_SIZE", default_value_t = 300,
          value_parser = clap::value_parser!(u64).range(1..))]
    chunk_size: u64,

    /// Primary speech engine.
    #[arg(long, env = "DOC2AUDIO_ENGINE", default_value = "espeak-ng")]
    engine: String,

    /// Engine used when the primary cannot be loaded.
    #[arg(long, env = "DOC2AUDIO_FALLBACK_ENGINE", default_value = "espeak")]
    fallback_engine: String,

    /// Voice or language passed to the engine.
    #[arg(long, env = "DOC2AUDIO_VOICE")]
    voice: Option<String>,

    /// ffmpeg executable used for MP3.
    #[arg(long, env = "DOC2AUDIO_FFMPEG", default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// Keep job files here instead of a temporary directory.
    #[arg(long, env = "DOC2AUDIO_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Largest accepted download, in bytes.
    #[arg(long, env = "DOC2AUDIO_MAX_UPLOAD_BYTES",
          default_value_t = edgequake_doc2audio::config::DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: usize,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "DOC2AUDIO_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Output a JSON summary instead of human-readable text.
    #[arg(long, env = "DOC2AUDIO_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOC2AUDIO_NO_PROGRESS")]
    no_progress: bool,

    /// Print text size and chunk count only, no synthesis.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOC2AUDIO_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOC2AUDIO_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Mp3,
    Wav,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Mp3 => OutputFormat::Mp3,
            FormatArg::Wav => OutputFormat::Wav,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar carries the feedback; library INFO logs would tear it.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // Job files live here unless --work-dir says otherwise.
    let scratch = tempfile::tempdir().context("Failed to create a temporary directory")?;
    let work_root = cli
        .work_dir
        .clone()
        .unwrap_or_else(|| scratch.path().to_path_buf());

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let config = build_config(&cli, &work_root, None)?;
        let summary = ConversionPipeline::from_config(config)
            .inspect(&cli.input)
            .await
            .context("Failed to inspect document")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
            );
        } else {
            println!("File:        {}", cli.input);
            println!("Format:      {}", summary.kind);
            println!("Characters:  {}", summary.characters);
            println!("Chunks:      {} (≤{} chars)", summary.chunks, cli.chunk_size);
        }
        return Ok(());
    }

    // ── Build config and submit ──────────────────────────────────────────
    let bar = show_progress.then(spinner);
    let callback = bar.clone().map(CliProgressCallback::new);
    let config = build_config(
        &cli,
        &work_root,
        callback.clone().map(|cb| cb as ProgressCallback),
    )?;

    let start = Instant::now();
    let manager = JobManager::new(config);
    if !manager.pipeline().synthesizer().is_available() {
        bail!(
            "No speech engine available: tried '{}' then '{}'. Install espeak-ng or pass --engine.",
            cli.engine,
            cli.fallback_engine
        );
    }

    let id = if is_url(&cli.input) {
        manager
            .submit_url(&cli.input)
            .await
            .context("Failed to download document")?
    } else {
        let path = PathBuf::from(&cli.input);
        if !path.is_file() {
            bail!("Document not found: '{}'", path.display());
        }
        manager.submit(path).await
    };

    // ── Follow progress ──────────────────────────────────────────────────
    let mut updates = manager.watch(id).await?;
    let mut last = None;
    while let Some(job) = updates.next().await {
        if let Some(ref bar) = bar {
            bar.set_position(job.progress.floor() as u64);
        }
        last = Some(job);
    }
    if let Some(ref bar) = bar {
        bar.finish_and_clear();
    }
    let job = match last {
        Some(job) => job,
        None => manager.status(id).await?,
    };

    if job.status != JobStatus::Completed {
        let reason = job.error.unwrap_or_else(|| "unknown error".to_string());
        if !cli.quiet {
            eprintln!("{} {}", red("✘"), reason);
        }
        bail!("Conversion failed");
    }

    // ── Deliver ──────────────────────────────────────────────────────────
    let (artifact, mut file) = manager
        .download(id)
        .await
        .context("Finished audio is not available")?;
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&artifact.download_name));
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut dest = tokio::fs::File::create(&output)
        .await
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let bytes = tokio::io::copy(&mut file, &mut dest)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    // ── Report ───────────────────────────────────────────────────────────
    if cli.json {
        let summary = serde_json::json!({
            "job": job,
            "output": output,
            "bytes": bytes,
            "elapsed_ms": start.elapsed().as_millis() as u64,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !cli.quiet {
        let produced = job.chunk_count.saturating_sub(job.failed_chunks);
        eprintln!(
            "{}  {}/{} chunks  {}  →  {}",
            if job.failed_chunks == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            produced,
            job.chunk_count,
            dim(&format!("{:.1}s", start.elapsed().as_secs_f64())),
            bold(&output.display().to_string()),
        );
        if let Some(cb) = callback {
            let failed = cb.failed.load(Ordering::SeqCst);
            if failed > 0 {
                eprintln!("   {} chunks skipped", red(&failed.to_string()));
            }
        }
    }

    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(
    cli: &Cli,
    work_root: &Path,
    progress: Option<ProgressCallback>,
) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .chunk_size(usize::try_from(cli.chunk_size).context("Chunk size too large")?)
        .primary_engine(&cli.engine)
        .fallback_engine(&cli.fallback_engine)
        .output_format(cli.format.into())
        .ffmpeg_path(&cli.ffmpeg)
        .max_concurrent_jobs(1)
        .max_upload_bytes(cli.max_upload_bytes)
        .upload_dir(work_root.join("uploads"))
        .output_dir(work_root.join("jobs"))
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref voice) = cli.voice {
        builder = builder.voice(voice);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
