//! Configuration types for interpretation and for the HTTP service.
//!
//! LLM behaviour is controlled through [`InterpreterConfig`], built via its
//! [`InterpreterConfigBuilder`]. Deployment settings (where the taxonomy lives,
//! where artifacts are written, which address to bind) live in
//! [`ServerConfig`]. The binary maps CLI flags and `AVGPT_*` environment
//! variables onto both.

use crate::error::AvError;
use crate::taxonomy::DEFAULT_TAXONOMY_PATH;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4";

/// Configuration for the LLM side of an interpretation.
///
/// # Example
/// ```rust
/// use avgpt::InterpreterConfig;
///
/// let config = InterpreterConfig::builder()
///     .model("gpt-4.1")
///     .temperature(0.2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct InterpreterConfig {
    /// LLM model identifier, e.g. "gpt-4", "claude-sonnet-4-20250514".
    /// If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the completion. Default: 0.3.
    ///
    /// Interpretation needs some latitude to guess at unknown abbreviations,
    /// but the reply must stay a parseable JSON document.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate. Default: 4096.
    ///
    /// Pull sheets and BOMs for large systems run long; too low a cap
    /// truncates the JSON mid-string and the reply becomes unparseable.
    pub max_tokens: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.3,
            max_tokens: 4096,
        }
    }
}

impl fmt::Debug for InterpreterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterpreterConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl InterpreterConfig {
    pub fn builder() -> InterpreterConfigBuilder {
        InterpreterConfigBuilder {
            config: Self::default(),
        }
    }

    /// The configured model, or [`DEFAULT_MODEL`].
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`InterpreterConfig`].
#[derive(Debug)]
pub struct InterpreterConfigBuilder {
    config: InterpreterConfig,
}

impl InterpreterConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<InterpreterConfig, AvError> {
        if self.config.max_tokens == 0 {
            return Err(AvError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if let Some(ref m) = self.config.model {
            if m.trim().is_empty() {
                return Err(AvError::InvalidConfig("model must not be empty".into()));
            }
        }
        Ok(self.config)
    }
}

/// Deployment settings for the HTTP service and the CLI.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP server binds. Default: 0.0.0.0:8000.
    pub bind: SocketAddr,

    /// Location of the shared taxonomy document. Default: `taxonomy_db.json`.
    pub taxonomy_path: PathBuf,

    /// Directory generated PDF/CSV artifacts are written to. Default: `generated`.
    pub output_dir: PathBuf,

    /// Directory containing libpdfium. If None, the system library is used.
    pub pdfium_lib_dir: Option<PathBuf>,

    /// Maximum accepted upload size in bytes. Default: 50 MiB.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            taxonomy_path: PathBuf::from(DEFAULT_TAXONOMY_PATH),
            output_dir: PathBuf::from("generated"),
            pdfium_lib_dir: None,
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = InterpreterConfig::default();
        assert_eq!(c.temperature, 0.3);
        assert_eq!(c.max_tokens, 4096);
        assert_eq!(c.model_or_default(), DEFAULT_MODEL);
    }

    #[test]
    fn builder_clamps_temperature() {
        let c = InterpreterConfig::builder().temperature(9.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn builder_rejects_zero_tokens() {
        assert!(InterpreterConfig::builder().max_tokens(0).build().is_err());
    }

    #[test]
    fn builder_rejects_blank_model() {
        assert!(InterpreterConfig::builder().model("  ").build().is_err());
    }

    #[test]
    fn server_defaults() {
        let s = ServerConfig::default();
        assert_eq!(s.bind.port(), 8000);
        assert_eq!(s.taxonomy_path, PathBuf::from("taxonomy_db.json"));
    }
}
