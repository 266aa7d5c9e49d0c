//! LLM interaction: send the interpretation prompt and return the raw reply.
//!
//! This module is intentionally thin; all prompt engineering lives in
//! [`crate::prompts`] and all reply parsing in [`super::reply`] and [`crate::interpret`]. The
//! [`CompletionBackend`] trait is the seam tests replace with a canned reply.
//!
//! There is no retry and no timeout: a failed call surfaces immediately as
//! [`AvError::Upstream`] and the caller decides what to do.

use crate::config::InterpreterConfig;
use crate::error::AvError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// A raw completion and its usage figures.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub content: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

/// Something that turns a prompt into reply text.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<Completion, AvError>;
}

/// [`CompletionBackend`] over an `edgequake-llm` provider.
pub struct ProviderBackend {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl ProviderBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &InterpreterConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
        }
    }

    /// Resolve the provider from `config` (see [`resolve_provider`]) and wrap it.
    pub fn from_config(config: &InterpreterConfig) -> Result<Self, AvError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }
}

#[async_trait]
impl CompletionBackend for ProviderBackend {
    async fn complete(&self, prompt: &str) -> Result<Completion, AvError> {
        let start = Instant::now();
        // The prompt carries its own role instructions; one user turn suffices.
        let messages = vec![ChatMessage::user(prompt)];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(AvError::upstream)?;

        let duration = start.elapsed();
        debug!(
            "LLM reply: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens, response.completion_tokens, duration
        );

        Ok(Completion {
            content: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
            duration_ms: duration.as_millis() as u64,
        })
    }
}

/// Build `CompletionOptions` from the interpreter config.
fn build_options(config: &InterpreterConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, AvError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        AvError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`): used as-is.
/// 2. **Named provider** (`config.provider_name`) with the configured model;
///    the factory reads that provider's API key from the environment.
/// 3. **`OPENAI_API_KEY`** present: OpenAI with the configured model.
/// 4. **Auto-detection** (`ProviderFactory::from_env`) across all known keys.
///
/// `from_env` falls back to the mock provider when it finds no key; that
/// fallback is rejected unless `EDGEQUAKE_LLM_PROVIDER` selected it. Failing
/// every step is [`AvError::ProviderNotConfigured`], fatal at startup.
pub fn resolve_provider(config: &InterpreterConfig) -> Result<Arc<dyn LLMProvider>, AvError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_provider(name, config.model_or_default());
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", config.model_or_default());
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| AvError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM credential found in the environment.\n\
                Set OPENAI_API_KEY (or ANTHROPIC_API_KEY / GEMINI_API_KEY) or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    let explicit = std::env::var("EDGEQUAKE_LLM_PROVIDER").is_ok_and(|v| !v.is_empty());
    reject_mock_fallback(llm_provider, explicit)
}

/// Refuse the mock provider unless it was asked for by name.
fn reject_mock_fallback(
    provider: Arc<dyn LLMProvider>,
    explicit: bool,
) -> Result<Arc<dyn LLMProvider>, AvError> {
    if provider.name() == "mock" && !explicit {
        return Err(AvError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: "No LLM credential found in the environment.\n\
                Set OPENAI_API_KEY (or ANTHROPIC_API_KEY / GEMINI_API_KEY) or pass --provider."
                .to_string(),
        });
    }
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgequake_llm::MockProvider;

    #[test]
    fn build_options_defaults() {
        let config = InterpreterConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.3));
        assert_eq!(opts.max_tokens, Some(4096));
    }

    #[test]
    fn mock_fallback_is_not_a_credential() {
        let mock: Arc<dyn LLMProvider> = Arc::new(MockProvider::new());
        let err = reject_mock_fallback(mock, false)
            .err()
            .expect("mock fallback must be rejected");
        assert!(matches!(err, AvError::ProviderNotConfigured { .. }));
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn mock_selected_by_name_is_allowed() {
        let mock: Arc<dyn LLMProvider> = Arc::new(MockProvider::new());
        let provider = reject_mock_fallback(mock, true).unwrap();
        assert_eq!(provider.name(), "mock");
    }

    #[test]
    fn prebuilt_provider_is_used_as_is() {
        let config = InterpreterConfig::builder()
            .provider(Arc::new(MockProvider::new()))
            .build()
            .unwrap();
        assert_eq!(resolve_provider(&config).unwrap().name(), "mock");
    }
}
