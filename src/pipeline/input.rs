//! Input resolution: turn a CLI argument (local path or URL) into PDF bytes.
//!
//! The HTTP endpoints receive bytes directly from a multipart upload; the CLI
//! accepts a path or an HTTP(S) URL. Both end up in [`ensure_pdf`] so a PNG
//! or HTML error page is rejected with a meaningful error before pdfium ever
//! sees it.

use crate::error::AvError;
use std::path::PathBuf;
use tracing::{debug, info};

/// A resolved input: the PDF bytes and a display name for logs and artifacts.
#[derive(Debug, Clone)]
pub struct PdfInput {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Reject bytes that do not start with the `%PDF` magic.
pub fn ensure_pdf(name: &str, bytes: &[u8]) -> Result<(), AvError> {
    if bytes.starts_with(b"%PDF") {
        Ok(())
    } else {
        Err(AvError::NotAPdf {
            name: name.to_string(),
            magic: bytes.iter().take(4).copied().collect(),
        })
    }
}

/// Resolve a local path or URL to validated PDF bytes.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<PdfInput, AvError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(input).await
    }
}

async fn read_local(path_str: &str) -> Result<PdfInput, AvError> {
    let path = PathBuf::from(path_str);

    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(AvError::PermissionDenied { path });
        }
        Err(_) => return Err(AvError::FileNotFound { path }),
    };

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path_str.to_string());
    ensure_pdf(&name, &bytes)?;

    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(PdfInput { name, bytes })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<PdfInput, AvError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| AvError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            AvError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| failed(e.to_string()))?
        .to_vec();

    let name = filename_from_url(url);
    ensure_pdf(&name, &bytes)?;

    info!("Downloaded {} ({} bytes)", name, bytes.len());
    Ok(PdfInput { name, bytes })
}

/// Last path segment of the URL if it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}
