//! PDF engine: text extraction from uploaded drawings and rendering of
//! generated documents, both via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which is not safe to call
//! from async contexts. Every call moves onto the blocking thread pool so the
//! Tokio workers keep serving requests while a large drawing is parsed.
//!
//! The library is bound once per engine (at [`PdfiumEngine::check`] or on
//! first use) and the binding is shared by every later call.
//!
//! ## Why a trait?
//!
//! The rest of the crate only needs "bytes in, text out" and "text in, PDF
//! out". [`PdfEngine`] keeps pdfium out of the interpretation and HTTP layers,
//! and lets tests run without a pdfium library installed.

use crate::error::AvError;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Text extraction and document rendering.
#[async_trait]
pub trait PdfEngine: Send + Sync {
    /// Extract the text of every page, pages separated by a blank line.
    async fn extract_text(&self, name: &str, bytes: Vec<u8>) -> Result<String, AvError>;

    /// Render a simple title + body document and return the PDF bytes.
    async fn render_document(&self, title: &str, body: &str) -> Result<Vec<u8>, AvError>;
}

/// [`PdfEngine`] backed by a pdfium shared library.
///
/// Clones share one binding.
#[derive(Debug, Clone, Default)]
pub struct PdfiumEngine {
    lib_dir: Option<PathBuf>,
    pdfium: Arc<OnceCell<Arc<Pdfium>>>,
}

impl PdfiumEngine {
    /// Use the pdfium found in `lib_dir`, or the system library when None.
    pub fn new(lib_dir: Option<PathBuf>) -> Self {
        Self {
            lib_dir,
            pdfium: Arc::new(OnceCell::new()),
        }
    }

    /// Bind now, to fail fast at startup rather than on the first upload.
    pub fn check(&self) -> Result<(), AvError> {
        if self.pdfium.initialized() {
            return Ok(());
        }
        let pdfium = bind_pdfium(self.lib_dir.as_deref())?;
        // A concurrent first use may have won; either binding is usable.
        let _ = self.pdfium.set(Arc::new(pdfium));
        Ok(())
    }

    async fn pdfium(&self) -> Result<Arc<Pdfium>, AvError> {
        let lib_dir = self.lib_dir.clone();
        self.pdfium
            .get_or_try_init(|| async move {
                tokio::task::spawn_blocking(move || bind_pdfium(lib_dir.as_deref()).map(Arc::new))
                    .await
                    .map_err(|e| AvError::Internal(format!("pdfium binding task panicked: {}", e)))?
            })
            .await
            .map(Arc::clone)
    }
}

#[async_trait]
impl PdfEngine for PdfiumEngine {
    async fn extract_text(&self, name: &str, bytes: Vec<u8>) -> Result<String, AvError> {
        let pdfium = self.pdfium().await?;
        let name = name.to_string();

        tokio::task::spawn_blocking(move || extract_text_blocking(&pdfium, &name, &bytes))
            .await
            .map_err(|e| AvError::Internal(format!("Extraction task panicked: {}", e)))?
    }

    async fn render_document(&self, title: &str, body: &str) -> Result<Vec<u8>, AvError> {
        let pdfium = self.pdfium().await?;
        let title = title.to_string();
        let body = body.to_string();

        tokio::task::spawn_blocking(move || render_document_blocking(&pdfium, &title, &body))
            .await
            .map_err(|e| AvError::Internal(format!("Render task panicked: {}", e)))?
    }
}

fn bind_pdfium(lib_dir: Option<&Path>) -> Result<Pdfium, AvError> {
    let bindings = match lib_dir {
        Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| AvError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// Blocking implementation of text extraction.
fn extract_text_blocking(pdfium: &Pdfium, name: &str, bytes: &[u8]) -> Result<String, AvError> {
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| AvError::CorruptPdf {
            name: name.to_string(),
            detail: format!("{:?}", e),
        })?;

    let pages = document.pages();
    info!("PDF '{}' loaded: {} pages", name, pages.len());

    let mut texts = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        match page.text() {
            Ok(text) => texts.push(text.all()),
            // A page without a text layer (pure scan) contributes nothing.
            Err(e) => warn!("Page {} of '{}' has no readable text: {:?}", idx + 1, name, e),
        }
    }

    let text = texts.join("\n\n");
    debug!("Extracted {} chars from '{}'", text.len(), name);
    Ok(text)
}

// ── Rendering ────────────────────────────────────────────────────────────

const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 56.0;
const TITLE_SIZE: f32 = 16.0;
const BODY_SIZE: f32 = 10.0;
const LINE_HEIGHT: f32 = 13.0;
/// Helvetica at 10pt fits roughly this many characters across A4 minus margins.
const WRAP_COLUMNS: usize = 92;
/// Body lines the title displaces on the first page.
const TITLE_LINES: usize = 3;

/// Blocking implementation of document rendering.
fn render_document_blocking(pdfium: &Pdfium, title: &str, body: &str) -> Result<Vec<u8>, AvError> {
    let render_err = |e: PdfiumError| AvError::Internal(format!("PDF rendering failed: {:?}", e));

    let mut document = pdfium.create_new_pdf().map_err(render_err)?;
    let regular = document.fonts_mut().helvetica();
    let bold = document.fonts_mut().helvetica_bold();

    let lines = layout_lines(body, WRAP_COLUMNS);
    let pages = paginate(&lines, lines_per_page(), TITLE_LINES);

    for (page_idx, chunk) in pages.iter().enumerate() {
        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::a4())
            .map_err(render_err)?;

        let mut y = PAGE_HEIGHT - MARGIN;
        if page_idx == 0 {
            page.objects_mut()
                .create_text_object(
                    PdfPoints::new(MARGIN),
                    PdfPoints::new(y),
                    title,
                    bold,
                    PdfPoints::new(TITLE_SIZE),
                )
                .map_err(render_err)?;
            y -= LINE_HEIGHT * TITLE_LINES as f32;
        }

        for line in chunk.iter() {
            if !line.is_empty() {
                page.objects_mut()
                    .create_text_object(
                        PdfPoints::new(MARGIN),
                        PdfPoints::new(y),
                        line,
                        regular,
                        PdfPoints::new(BODY_SIZE),
                    )
                    .map_err(render_err)?;
            }
            y -= LINE_HEIGHT;
        }
    }

    let bytes = document.save_to_bytes().map_err(render_err)?;
    debug!("Rendered '{}' → {} pages, {} bytes", title, pages.len(), bytes.len());
    Ok(bytes)
}

fn lines_per_page() -> usize {
    ((PAGE_HEIGHT - 2.0 * MARGIN) / LINE_HEIGHT) as usize
}

/// Split `body` into display lines, word-wrapping at `columns` characters.
///
/// Blank lines are kept as empty strings so paragraphs stay separated.
/// A single word longer than `columns` is hard-split.
pub(crate) fn layout_lines(body: &str, columns: usize) -> Vec<String> {
    let mut out = Vec::new();
    for raw in body.lines() {
        let raw = raw.trim_end();
        if raw.is_empty() {
            out.push(String::new());
            continue;
        }

        let mut current = String::new();
        for word in raw.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > columns {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
                out.push(word.drain(..columns).collect());
            }
            let word: String = word.into_iter().collect();
            if word.is_empty() {
                continue;
            }

            let needed = if current.is_empty() {
                word.chars().count()
            } else {
                current.chars().count() + 1 + word.chars().count()
            };
            if needed > columns && !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&word);
        }
        if !current.is_empty() {
            out.push(current);
        }
    }
    out
}

/// Group lines into pages; the first page holds `first_page_reserved` fewer.
/// Always yields at least one (possibly empty) page.
pub(crate) fn paginate(lines: &[String], per_page: usize, first_page_reserved: usize) -> Vec<&[String]> {
    let per_page = per_page.max(1);
    let first = per_page.saturating_sub(first_page_reserved).max(1);

    let mut pages = Vec::new();
    let (head, mut rest) = lines.split_at(first.min(lines.len()));
    pages.push(head);
    while !rest.is_empty() {
        let (chunk, tail) = rest.split_at(per_page.min(rest.len()));
        pages.push(chunk);
        rest = tail;
    }
    pages
}
