//! Provider resolution with and without credentials in the environment.
//!
//! Everything runs in one test: the environment is process-wide.

use avgpt::{AvError, InterpreterConfig, ProviderBackend};

const CREDENTIAL_VARS: &[&str] = &[
    "EDGEQUAKE_LLM_PROVIDER",
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
    "GEMINI_API_KEY",
    "GOOGLE_API_KEY",
    "MISTRAL_API_KEY",
    "AZURE_OPENAI_CONTENTGEN_API_KEY",
    "AZURE_OPENAI_API_KEY",
    "XAI_API_KEY",
    "HF_TOKEN",
    "HUGGINGFACE_TOKEN",
    "OPENROUTER_API_KEY",
    "OLLAMA_HOST",
    "OLLAMA_MODEL",
    "LMSTUDIO_HOST",
    "LMSTUDIO_MODEL",
];

#[test]
fn missing_credential_is_fatal_unless_mock_is_selected() {
    for var in CREDENTIAL_VARS {
        std::env::remove_var(var);
    }

    let err = ProviderBackend::from_config(&InterpreterConfig::default())
        .err()
        .expect("a backend was built without any credential");
    assert!(matches!(err, AvError::ProviderNotConfigured { .. }));

    std::env::set_var("EDGEQUAKE_LLM_PROVIDER", "mock");
    assert!(ProviderBackend::from_config(&InterpreterConfig::default()).is_ok());
    std::env::remove_var("EDGEQUAKE_LLM_PROVIDER");
}
