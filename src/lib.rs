//! # avgpt
//!
//! Interpret AV (audio-visual) system drawings with a large language model.
//!
//! A drawing's text layer is sent to an LLM together with a shared taxonomy of
//! known AV vocabulary. The reply is turned into a structured
//! [`Interpretation`] (summary, devices, signal flow, notes), newly seen
//! vocabulary is merged back into the taxonomy, and optional derivative
//! documents (cable pull sheet, reflected bill of materials, ...) are exported
//! as PDF and CSV.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Extract    text layer via pdfium (spawn_blocking)
//!  ├─ 2. Prompt     instructions + known taxonomy + OCR text + extras
//!  ├─ 3. LLM        one chat completion, reply parsed as JSON
//!  ├─ 4. Learn      new_taxonomy_entries merged into taxonomy_db.json
//!  └─ 5. Export     summary PDF, plus PDF + CSV per derivative document
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use avgpt::{
//!     FileTaxonomyStore, InterpretRequest, Interpreter, InterpreterConfig, ProviderBackend,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let backend = ProviderBackend::from_config(&InterpreterConfig::default())?;
//!     let interpreter = Interpreter::new(
//!         Arc::new(backend),
//!         Arc::new(FileTaxonomyStore::new("taxonomy_db.json")),
//!     );
//!
//!     let request = InterpretRequest::new("RACK A: DMPS3-4K-350-C feeds DISPLAY 1");
//!     let interpretation = interpreter.interpret(&request).await?;
//!     println!("{}", interpretation.summary);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | The `avgpt` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `server` | on      | The axum HTTP surface in [`server`] |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod error;
pub mod export;
pub mod interpret;
pub mod pipeline;
pub mod progress;
pub mod prompts;
#[cfg(feature = "server")]
pub mod server;
pub mod tasks;
pub mod taxonomy;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{AnalysisOutput, AnalysisStats, Pipeline};
pub use config::{InterpreterConfig, InterpreterConfigBuilder, ServerConfig};
pub use error::AvError;
pub use export::{Artifact, ArtifactKind, ArtifactStore};
pub use interpret::{InterpretRequest, Interpretation, Interpreter};
pub use pipeline::llm::{Completion, CompletionBackend, ProviderBackend};
pub use pipeline::pdf::{PdfEngine, PdfiumEngine};
pub use progress::{NoopCallback, PipelineCallback, ProgressCallback};
pub use prompts::{build_prompt, Extras};
pub use tasks::{MemoryStatusStore, StatusStore, TaskHandle, TaskRunner, TaskStatus, UNKNOWN_TASK};
pub use taxonomy::{FileTaxonomyStore, MemoryTaxonomyStore, MergeOutcome, Taxonomy, TaxonomyRepository};
