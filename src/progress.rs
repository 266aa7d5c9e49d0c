//! Progress callbacks for the analysis pipeline.
//!
//! Pass an [`Arc<dyn PipelineCallback>`] to [`crate::analyze::Pipeline`] to
//! observe each stage of a drawing's journey from PDF bytes to exported
//! artifacts. The CLI drives a terminal spinner from these events; background
//! uploads use them to move their task status forward.
//!
//! # Example
//!
//! ```rust
//! use avgpt::PipelineCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct DeviceCounter(AtomicUsize);
//!
//! impl PipelineCallback for DeviceCounter {
//!     fn on_interpretation_complete(&self, devices: usize) {
//!         self.0.fetch_add(devices, Ordering::SeqCst);
//!     }
//! }
//! ```

use std::sync::Arc;

/// Called by the pipeline as a drawing moves through each stage.
///
/// All methods default to no-ops so implementations override only what they
/// need. The pipeline may run several drawings at once, so implementations
/// must protect shared state themselves.
pub trait PipelineCallback: Send + Sync {
    /// Called before text extraction starts.
    fn on_extraction_start(&self, name: &str) {
        let _ = name;
    }

    /// Called once the text layer has been read.
    ///
    /// # Arguments
    /// * `chars`: number of characters extracted, zero for a pure scan
    fn on_extraction_complete(&self, name: &str, chars: usize) {
        let _ = (name, chars);
    }

    /// Called just before the LLM request is sent for `text_chars` of OCR text.
    fn on_interpretation_start(&self, name: &str, text_chars: usize) {
        let _ = (name, text_chars);
    }

    /// Called when the reply has been parsed and the taxonomy merged.
    fn on_interpretation_complete(&self, devices: usize) {
        let _ = devices;
    }

    /// Called after every artifact has been written.
    fn on_export_complete(&self, artifacts: usize) {
        let _ = artifacts;
    }
}

/// Callback that ignores every event. The default when none is configured.
pub struct NoopCallback;

impl PipelineCallback for NoopCallback {}

/// Shared handle stored by the pipeline.
pub type ProgressCallback = Arc<dyn PipelineCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl PipelineCallback for Recorder {
        fn on_extraction_start(&self, name: &str) {
            self.events.lock().unwrap().push(format!("extract:{name}"));
        }

        fn on_interpretation_complete(&self, devices: usize) {
            self.events.lock().unwrap().push(format!("devices:{devices}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopCallback;
        cb.on_extraction_start("plan.pdf");
        cb.on_extraction_complete("plan.pdf", 120);
        cb.on_interpretation_start("plan.pdf", 4000);
        cb.on_interpretation_complete(3);
        cb.on_export_complete(5);
    }

    #[test]
    fn overridden_methods_receive_events() {
        let rec = Recorder::default();
        rec.on_extraction_start("plan.pdf");
        rec.on_extraction_complete("plan.pdf", 10);
        rec.on_interpretation_complete(2);
        assert_eq!(
            *rec.events.lock().unwrap(),
            vec!["extract:plan.pdf".to_string(), "devices:2".to_string()]
        );
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopCallback);
        cb.on_export_complete(1);
    }
}
