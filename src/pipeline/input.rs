//! Input resolution: normalise a user-supplied path or URL to a local file.
//!
//! Extraction backends need a file-system path, so URL inputs are fetched
//! into a `TempDir` that lives as long as the returned [`ResolvedInput`].
//! The downloaded file keeps the URL's file name because the extension is
//! what decides how the document is read.

use crate::error::Doc2AudioError;
use futures::StreamExt;
use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

/// A local path, or a downloaded copy kept alive by its temp directory.
#[derive(Debug)]
pub enum ResolvedInput {
    Local(PathBuf),
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

/// Body and best-guess file name of a fetched document.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve `input` to a readable local file, downloading URLs first.
///
/// Downloads larger than `max_bytes` are refused.
pub async fn resolve_input(
    input: &str,
    timeout_secs: u64,
    max_bytes: usize,
) -> Result<ResolvedInput, Doc2AudioError> {
    if is_url(input) {
        download_url(input, timeout_secs, max_bytes).await
    } else {
        resolve_local(input)
    }
}

fn resolve_local(path_str: &str) -> Result<ResolvedInput, Doc2AudioError> {
    let path = PathBuf::from(path_str);

    if !path.is_file() {
        return Err(Doc2AudioError::FileNotFound { path });
    }
    if let Err(e) = std::fs::File::open(&path) {
        return Err(match e.kind() {
            std::io::ErrorKind::NotFound => Doc2AudioError::FileNotFound { path },
            _ => Doc2AudioError::io(path, e),
        });
    }

    debug!("Resolved local document: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

async fn download_url(
    url: &str,
    timeout_secs: u64,
    max_bytes: usize,
) -> Result<ResolvedInput, Doc2AudioError> {
    let fetched = fetch_url(url, timeout_secs, max_bytes).await?;

    let temp_dir = TempDir::new().map_err(|e| Doc2AudioError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&fetched.filename);
    tokio::fs::write(&file_path, &fetched.bytes)
        .await
        .map_err(|e| Doc2AudioError::io(&file_path, e))?;

    info!("Downloaded to: {}", file_path.display());
    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// GET `url` into memory, stopping as soon as the body passes `max_bytes`.
pub async fn fetch_url(
    url: &str,
    timeout_secs: u64,
    max_bytes: usize,
) -> Result<FetchedDocument, Doc2AudioError> {
    info!("Downloading document from: {}", url);

    let failed = |reason: String| Doc2AudioError::DownloadFailed {
        url: url.to_string(),
        reason,
    };
    let classify = |e: reqwest::Error| {
        if e.is_timeout() {
            Doc2AudioError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(classify)?;
    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let filename = filename_from_url(url)
        .unwrap_or_else(|| fallback_filename(content_type.as_deref()).to_string());

    let too_large = |size: usize| Doc2AudioError::UploadTooLarge {
        size,
        limit: max_bytes,
    };
    if let Some(declared) = response.content_length() {
        let declared = usize::try_from(declared).unwrap_or(usize::MAX);
        if declared > max_bytes {
            return Err(too_large(declared));
        }
    }

    let mut bytes = Vec::new();
    let mut body = response.bytes_stream();
    while let Some(piece) = body.next().await {
        let piece = piece.map_err(classify)?;
        let received = bytes.len() + piece.len();
        if received > max_bytes {
            return Err(too_large(received));
        }
        bytes.extend_from_slice(&piece);
    }
    debug!("Fetched {} bytes as '{}'", bytes.len(), filename);

    Ok(FetchedDocument { filename, bytes })
}

/// Percent-decoded last path segment of `url`, if it looks like a file name.
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    let decoded = percent_decode_str(segment).decode_utf8_lossy();
    // An encoded separator must not turn into a path.
    let name = decoded.rsplit(['/', '\\']).next()?.trim();
    let usable = name.contains('.') && name.chars().any(|c| c != '.');
    usable.then(|| name.to_string())
}

/// Name a download after its media type when the URL has no file name.
fn fallback_filename(content_type: Option<&str>) -> &'static str {
    match content_type.map(|ct| ct.split(';').next().unwrap_or(ct).trim()) {
        Some("application/epub+zip") => "download.epub",
        _ => "download.pdf",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/book.epub"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_taken_from_last_segment() {
        assert_eq!(
            filename_from_url("https://example.com/library/Moby%20Dick.epub?x=1").as_deref(),
            Some("Moby Dick.epub")
        );
        assert_eq!(
            filename_from_url("https://example.com/x/..%2F..%2Fevil.pdf").as_deref(),
            Some("evil.pdf")
        );
        assert_eq!(filename_from_url("https://example.com/a/%2E%2E"), None);
        assert_eq!(filename_from_url("https://example.com/download"), None);
        assert_eq!(filename_from_url("https://example.com/"), None);
        assert_eq!(filename_from_url("not a url"), None);
    }

    #[test]
    fn fallback_name_follows_content_type() {
        assert_eq!(fallback_filename(Some("application/epub+zip")), "download.epub");
        assert_eq!(
            fallback_filename(Some("application/pdf; charset=binary")),
            "download.pdf"
        );
        assert_eq!(fallback_filename(None), "download.pdf");
    }

    #[tokio::test]
    async fn missing_local_file() {
        let err = resolve_input("/nonexistent/dir/book.pdf", 5, 1024).await.unwrap_err();
        assert!(matches!(err, Doc2AudioError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn existing_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        let resolved = resolve_input(path.to_str().unwrap(), 5, 1024).await.unwrap();
        assert_eq!(resolved.path(), path.as_path());
    }

    /// Serve one canned HTTP response on a loopback port.
    async fn serve_once(response: Vec<u8>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 2048];
            let _ = socket.read(&mut request).await;
            let _ = socket.write_all(&response).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn fetch_decodes_filename_and_keeps_body() {
        let base = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello".to_vec(),
        )
        .await;
        let fetched = fetch_url(&format!("{base}/books/Moby%20Dick.epub"), 5, 1024)
            .await
            .unwrap();
        assert_eq!(fetched.filename, "Moby Dick.epub");
        assert_eq!(fetched.bytes, b"hello");
    }

    #[tokio::test]
    async fn fetch_rejects_declared_length_over_limit() {
        let base = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 4096\r\nConnection: close\r\n\r\n".to_vec(),
        )
        .await;
        let err = fetch_url(&format!("{base}/big.pdf"), 5, 1024).await.unwrap_err();
        assert!(matches!(
            err,
            Doc2AudioError::UploadTooLarge { size: 4096, limit: 1024 }
        ));
    }

    #[tokio::test]
    async fn fetch_stops_undeclared_body_at_limit() {
        let mut response = b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n".to_vec();
        response.extend(std::iter::repeat(b'x').take(4096));
        let base = serve_once(response).await;
        let err = fetch_url(&format!("{base}/stream.pdf"), 5, 1024).await.unwrap_err();
        match err {
            Doc2AudioError::UploadTooLarge { size, limit } => {
                assert_eq!(limit, 1024);
                assert!(size > 1024);
            }
            other => panic!("expected UploadTooLarge, got {other:?}"),
        }
    }
}
