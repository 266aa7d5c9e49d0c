//! Error types for the avgpt library.
//!
//! Every failure that stops a request is an [`AvError`]. Lenient cases are not
//! errors at all: a field missing from the LLM reply becomes an empty value
//! (see [`crate::interpret::Interpretation::from_reply`]), and a background
//! task failure is recorded as a status string rather than propagated (see
//! [`crate::tasks`]).

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the avgpt library.
#[derive(Debug, Error)]
pub enum AvError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes were read, but they are not a PDF.
    #[error("'{name}' is not a valid PDF (first bytes: {magic:?})")]
    NotAPdf { name: String, magic: Vec<u8> },

    /// A request was malformed (missing multipart field, bad flag, …).
    #[error("Bad request: {0}")]
    BadRequest(String),

    // ── PDF errors ────────────────────────────────────────────────────────
    /// pdfium could not open the document.
    #[error("PDF '{name}' could not be opened: {detail}")]
    CorruptPdf { name: String, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium for your platform, or point --pdfium-lib-dir\n\
(AVGPT_PDFIUM_LIB_DIR) at the directory that contains it.\n"
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM call raised, or its reply was not a JSON document.
    #[error("{message}")]
    Upstream { message: String },

    // ── Taxonomy errors ───────────────────────────────────────────────────
    /// The taxonomy document exists but could not be read.
    #[error("Failed to read taxonomy '{path}': {source}")]
    TaxonomyRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The taxonomy document is not valid JSON.
    #[error("Taxonomy '{path}' is malformed: {source}")]
    TaxonomyMalformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The merged taxonomy could not be written back.
    #[error("Failed to write taxonomy '{path}': {detail}")]
    TaxonomyWrite { path: PathBuf, detail: String },

    // ── Export errors ─────────────────────────────────────────────────────
    /// A generated artifact could not be rendered or written.
    #[error("Failed to write artifact '{path}': {detail}")]
    ArtifactWrite { path: PathBuf, detail: String },

    /// A requested artifact does not exist (or its name is not allowed).
    #[error("File not found: {name}")]
    ArtifactNotFound { name: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AvError {
    /// Wrap any displayable upstream failure.
    pub fn upstream(message: impl std::fmt::Display) -> Self {
        AvError::Upstream {
            message: message.to_string(),
        }
    }

    /// True for errors caused by the caller's input rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AvError::NotAPdf { .. } | AvError::BadRequest(_) | AvError::CorruptPdf { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_display_is_the_bare_message() {
        let e = AvError::upstream("rate limited by provider");
        assert_eq!(e.to_string(), "rate limited by provider");
    }

    #[test]
    fn not_a_pdf_display() {
        let e = AvError::NotAPdf {
            name: "plan.png".into(),
            magic: b"\x89PNG".to_vec(),
        };
        assert!(e.to_string().contains("plan.png"));
        assert!(e.is_client_error());
    }

    #[test]
    fn artifact_not_found_display() {
        let e = AvError::ArtifactNotFound {
            name: "missing.csv".into(),
        };
        assert!(e.to_string().contains("missing.csv"));
        assert!(!e.is_client_error());
    }

    #[test]
    fn taxonomy_write_display() {
        let e = AvError::TaxonomyWrite {
            path: PathBuf::from("taxonomy_db.json"),
            detail: "disk full".into(),
        };
        assert!(e.to_string().contains("taxonomy_db.json"));
        assert!(e.to_string().contains("disk full"));
    }
}
