//! Shared application state for the HTTP surface.

use std::sync::Arc;

use crate::analyze::Pipeline;
use crate::config::ServerConfig;
use crate::error::AvError;
use crate::export::ArtifactStore;
use crate::interpret::Interpreter;
use crate::pipeline::llm::CompletionBackend;
use crate::tasks::TaskRunner;

/// Cheap-to-clone handle passed to every handler.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    pipeline: Pipeline,
    tasks: TaskRunner,
}

impl AppState {
    pub fn new(config: ServerConfig, pipeline: Pipeline, tasks: TaskRunner) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                pipeline,
                tasks,
            }),
        }
    }

    /// Everything from `config`: file taxonomy, artifact directory, pdfium
    /// and an in-memory task registry.
    pub fn from_config(
        config: ServerConfig,
        backend: Arc<dyn CompletionBackend>,
    ) -> Result<Self, AvError> {
        let pipeline = Pipeline::with_pdfium(&config, backend)?;
        Ok(Self::new(config, pipeline, TaskRunner::in_memory()))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.inner.pipeline
    }

    pub fn interpreter(&self) -> &Interpreter {
        self.inner.pipeline.interpreter()
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        self.inner.pipeline.artifacts()
    }

    pub fn tasks(&self) -> &TaskRunner {
        &self.inner.tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::Completion;
    use async_trait::async_trait;

    struct Unused;

    #[async_trait]
    impl CompletionBackend for Unused {
        async fn complete(&self, _prompt: &str) -> Result<Completion, AvError> {
            Ok(Completion::default())
        }
    }

    #[test]
    fn from_config_binds_the_configured_pdfium() {
        let config = ServerConfig {
            pdfium_lib_dir: Some("/nonexistent/pdfium".into()),
            ..ServerConfig::default()
        };
        let err = AppState::from_config(config, Arc::new(Unused)).err().unwrap();
        assert!(matches!(err, AvError::PdfiumBindingFailed(_)));
    }
}
