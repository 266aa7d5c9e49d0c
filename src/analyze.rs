//! End-to-end drawing analysis: PDF bytes in, interpretation and artifacts out.
//!
//! ```text
//! bytes ──▶ ensure_pdf ──▶ PdfEngine::extract_text ──▶ Interpreter::interpret
//!                                                            │
//!            AnalysisOutput ◀── ArtifactStore::export ◀──────┘
//! ```
//!
//! Every stage reports to the configured [`PipelineCallback`]. The first
//! failing stage aborts the run; artifacts already written stay on disk.

use crate::config::ServerConfig;
use crate::error::AvError;
use crate::export::{artifact_stem, Artifact, ArtifactStore};
use crate::interpret::{InterpretRequest, Interpretation, Interpreter};
use crate::pipeline::input::{ensure_pdf, resolve_input};
use crate::pipeline::llm::CompletionBackend;
use crate::pipeline::pdf::{PdfEngine, PdfiumEngine};
use crate::progress::{NoopCallback, ProgressCallback};
use crate::prompts::Extras;
use crate::taxonomy::FileTaxonomyStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Timing and size figures for one analysed drawing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisStats {
    pub extracted_chars: usize,
    pub extraction_ms: u64,
    pub interpretation_ms: u64,
    pub total_ms: u64,
    pub artifact_count: usize,
}

/// Result of [`Pipeline::analyze_bytes`].
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutput {
    pub interpretation: Interpretation,
    pub artifacts: Vec<Artifact>,
    pub stats: AnalysisStats,
}

impl AnalysisOutput {
    pub fn filenames(&self) -> Vec<String> {
        self.artifacts.iter().map(|a| a.filename.clone()).collect()
    }
}

/// Wires extraction, interpretation and export together.
#[derive(Clone)]
pub struct Pipeline {
    engine: Arc<dyn PdfEngine>,
    interpreter: Interpreter,
    artifacts: ArtifactStore,
    callback: ProgressCallback,
}

impl Pipeline {
    pub fn new(engine: Arc<dyn PdfEngine>, interpreter: Interpreter, artifacts: ArtifactStore) -> Self {
        Self {
            engine,
            interpreter,
            artifacts,
            callback: Arc::new(NoopCallback),
        }
    }

    /// File-backed pipeline: the taxonomy at `config.taxonomy_path`,
    /// artifacts under `config.output_dir`.
    pub fn from_config(
        config: &ServerConfig,
        backend: Arc<dyn CompletionBackend>,
        engine: Arc<dyn PdfEngine>,
    ) -> Self {
        let interpreter = Interpreter::new(
            backend,
            Arc::new(FileTaxonomyStore::new(&config.taxonomy_path)),
        );
        let artifacts = ArtifactStore::new(&config.output_dir, Arc::clone(&engine));
        Self::new(engine, interpreter, artifacts)
    }

    /// [`Pipeline::from_config`] over pdfium from `config.pdfium_lib_dir`,
    /// bound up front so a missing library fails here.
    pub fn with_pdfium(
        config: &ServerConfig,
        backend: Arc<dyn CompletionBackend>,
    ) -> Result<Self, AvError> {
        let engine = PdfiumEngine::new(config.pdfium_lib_dir.clone());
        engine.check()?;
        Ok(Self::from_config(config, backend, Arc::new(engine)))
    }

    /// Replace the progress callback.
    pub fn with_callback(mut self, callback: ProgressCallback) -> Self {
        self.callback = callback;
        self
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Extract the text layer of a PDF upload.
    async fn extract(&self, bytes: Vec<u8>, filename: &str) -> Result<(String, u64), AvError> {
        ensure_pdf(filename, &bytes)?;
        self.callback.on_extraction_start(filename);

        let start = Instant::now();
        let text = self.engine.extract_text(filename, bytes).await?;
        let elapsed = start.elapsed().as_millis() as u64;

        if text.trim().is_empty() {
            warn!("'{}' has no text layer; interpreting an empty document", filename);
        }
        self.callback.on_extraction_complete(filename, text.chars().count());
        Ok((text, elapsed))
    }

    async fn interpret_text(
        &self,
        text: String,
        filename: &str,
        extras: Extras,
    ) -> Result<Interpretation, AvError> {
        self.callback
            .on_interpretation_start(filename, text.chars().count());
        let request = InterpretRequest::new(text).with_extras(extras);
        let interpretation = self.interpreter.interpret(&request).await?;
        self.callback
            .on_interpretation_complete(interpretation.devices.len());
        Ok(interpretation)
    }

    /// Extract and interpret, without writing any artifacts.
    pub async fn interpret_bytes(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        extras: Extras,
    ) -> Result<Interpretation, AvError> {
        let (text, _) = self.extract(bytes, filename).await?;
        self.interpret_text(text, filename, extras).await
    }

    /// Extract, interpret and export one drawing.
    pub async fn analyze_bytes(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        extras: Extras,
    ) -> Result<AnalysisOutput, AvError> {
        let total_start = Instant::now();
        info!("Analysing '{}' ({} bytes)", filename, bytes.len());

        let (text, extraction_ms) = self.extract(bytes, filename).await?;
        let extracted_chars = text.chars().count();

        let llm_start = Instant::now();
        let interpretation = self.interpret_text(text, filename, extras).await?;
        let interpretation_ms = llm_start.elapsed().as_millis() as u64;

        let artifacts = self
            .artifacts
            .export_interpretation(&artifact_stem(filename), &interpretation)
            .await?;
        self.callback.on_export_complete(artifacts.len());

        let stats = AnalysisStats {
            extracted_chars,
            extraction_ms,
            interpretation_ms,
            total_ms: total_start.elapsed().as_millis() as u64,
            artifact_count: artifacts.len(),
        };
        info!(
            "Analysed '{}': {} devices, {} artifacts in {}ms",
            filename,
            interpretation.devices.len(),
            stats.artifact_count,
            stats.total_ms
        );

        Ok(AnalysisOutput {
            interpretation,
            artifacts,
            stats,
        })
    }

    /// Resolve a local path or URL, then run [`Pipeline::analyze_bytes`].
    pub async fn analyze_input(
        &self,
        input: &str,
        download_timeout_secs: u64,
        extras: Extras,
    ) -> Result<AnalysisOutput, AvError> {
        let resolved = resolve_input(input, download_timeout_secs).await?;
        self.analyze_bytes(resolved.bytes, &resolved.name, extras)
            .await
    }
}
