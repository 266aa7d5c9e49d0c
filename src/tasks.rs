//! Background task tracking for asynchronous uploads.
//!
//! Each submitted unit of work gets a UUID and walks one state machine:
//!
//! ```text
//! Processing started ──▶ Running OCR and analysis ──▶ Complete
//!                                                 └─▶ Error: <message>
//! ```
//!
//! Transitions are driven only by the unit of work; readers just look up the
//! current string. Statuses live in a [`StatusStore`] that is never pruned.
//! Nothing is cancelled, timed out or retried, and the unit's result is not
//! retrievable through the handle; callers publish results as artifacts.

use crate::error::AvError;
use crate::progress::PipelineCallback;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, RwLock};
use tracing::{error, info};
use uuid::Uuid;

/// Returned for task ids that were never submitted.
pub const UNKNOWN_TASK: &str = "Unknown Task ID";

/// Lifecycle of a background task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    ProcessingStarted,
    RunningAnalysis,
    Complete,
    Error(String),
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::ProcessingStarted => f.write_str("Processing started"),
            TaskStatus::RunningAnalysis => f.write_str("Running OCR and analysis"),
            TaskStatus::Complete => f.write_str("Complete"),
            TaskStatus::Error(message) => write!(f, "Error: {message}"),
        }
    }
}

/// Key-value storage for task statuses.
///
/// Writes to distinct keys must not interfere; no ordering is promised
/// between a task's writes and concurrent reads.
pub trait StatusStore: Send + Sync {
    fn set(&self, task_id: &str, status: TaskStatus);
    fn get(&self, task_id: &str) -> Option<TaskStatus>;
}

/// Process-wide in-memory [`StatusStore`].
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    statuses: RwLock<HashMap<String, TaskStatus>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.statuses.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StatusStore for MemoryStatusStore {
    fn set(&self, task_id: &str, status: TaskStatus) {
        // A poisoned lock only means another writer panicked mid-insert;
        // the map itself is still usable.
        let mut statuses = self.statuses.write().unwrap_or_else(|e| e.into_inner());
        statuses.insert(task_id.to_string(), status);
    }

    fn get(&self, task_id: &str) -> Option<TaskStatus> {
        let statuses = self.statuses.read().unwrap_or_else(|e| e.into_inner());
        statuses.get(task_id).cloned()
    }
}

/// Lets a running unit of work report progress on its own task.
#[derive(Clone)]
pub struct TaskReporter {
    task_id: String,
    store: Arc<dyn StatusStore>,
}

impl TaskReporter {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn set(&self, status: TaskStatus) {
        self.store.set(&self.task_id, status);
    }
}

/// A reporter doubles as a pipeline callback: once extraction begins the task
/// is `Running OCR and analysis`.
impl PipelineCallback for TaskReporter {
    fn on_extraction_start(&self, _name: &str) {
        self.set(TaskStatus::RunningAnalysis);
    }
}

/// Returned by [`TaskRunner::submit`]. Exposes only the id to poll with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle {
    pub task_id: String,
}

/// Submits fire-and-forget units of work and tracks their status.
#[derive(Clone)]
pub struct TaskRunner {
    store: Arc<dyn StatusStore>,
}

impl TaskRunner {
    pub fn new(store: Arc<dyn StatusStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStatusStore::new()))
    }

    /// Spawn `unit` on the current Tokio runtime.
    ///
    /// The status is `Processing started` before this returns. When the unit
    /// finishes, the status becomes `Complete`, or `Error: <message>` if it
    /// returned an error. The unit may report intermediate states through the
    /// [`TaskReporter`] it receives.
    pub fn submit<F, Fut>(&self, unit: F) -> TaskHandle
    where
        F: FnOnce(TaskReporter) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), AvError>> + Send + 'static,
    {
        let task_id = Uuid::new_v4().to_string();
        self.store.set(&task_id, TaskStatus::ProcessingStarted);

        let reporter = TaskReporter {
            task_id: task_id.clone(),
            store: Arc::clone(&self.store),
        };
        tokio::spawn(async move {
            let final_status = match unit(reporter.clone()).await {
                Ok(()) => {
                    info!(task_id = %reporter.task_id, "Background task complete");
                    TaskStatus::Complete
                }
                Err(e) => {
                    error!(task_id = %reporter.task_id, "Background task failed: {}", e);
                    TaskStatus::Error(e.to_string())
                }
            };
            reporter.set(final_status);
        });

        TaskHandle { task_id }
    }

    /// Current status string, or [`UNKNOWN_TASK`].
    pub fn status(&self, task_id: &str) -> String {
        self.store
            .get(task_id)
            .map(|s| s.to_string())
            .unwrap_or_else(|| UNKNOWN_TASK.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records every transition so tests can assert the sequence.
    #[derive(Default)]
    struct RecordingStore {
        inner: MemoryStatusStore,
        log: Mutex<Vec<(String, TaskStatus)>>,
    }

    impl StatusStore for RecordingStore {
        fn set(&self, task_id: &str, status: TaskStatus) {
            self.log.lock().unwrap().push((task_id.to_string(), status.clone()));
            self.inner.set(task_id, status);
        }

        fn get(&self, task_id: &str) -> Option<TaskStatus> {
            self.inner.get(task_id)
        }
    }

    async fn wait_for_final(runner: &TaskRunner, task_id: &str) -> String {
        for _ in 0..200 {
            let s = runner.status(task_id);
            if s == "Complete" || s.starts_with("Error: ") {
                return s;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task {task_id} never finished");
    }

    #[test]
    fn status_strings() {
        assert_eq!(TaskStatus::ProcessingStarted.to_string(), "Processing started");
        assert_eq!(TaskStatus::RunningAnalysis.to_string(), "Running OCR and analysis");
        assert_eq!(TaskStatus::Complete.to_string(), "Complete");
        assert_eq!(TaskStatus::Error("boom".into()).to_string(), "Error: boom");
    }

    #[test]
    fn unknown_task_is_the_sentinel() {
        let runner = TaskRunner::in_memory();
        assert_eq!(runner.status("nope"), UNKNOWN_TASK);
    }

    #[tokio::test]
    async fn successful_task_walks_the_state_machine() {
        let store = Arc::new(RecordingStore::default());
        let runner = TaskRunner::new(store.clone());

        let handle = runner.submit(|reporter| async move {
            reporter.set(TaskStatus::RunningAnalysis);
            Ok(())
        });
        assert_eq!(wait_for_final(&runner, &handle.task_id).await, "Complete");

        let log: Vec<TaskStatus> = store
            .log
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == handle.task_id)
            .map(|(_, s)| s.clone())
            .collect();
        assert_eq!(
            log,
            vec![
                TaskStatus::ProcessingStarted,
                TaskStatus::RunningAnalysis,
                TaskStatus::Complete
            ]
        );
    }

    #[tokio::test]
    async fn reporter_callback_marks_task_running() {
        let store = Arc::new(MemoryStatusStore::new());
        let runner = TaskRunner::new(store.clone());
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = runner.submit(|reporter| async move {
            reporter.on_extraction_start("plan.pdf");
            let _ = rx.await;
            Ok(())
        });
        for _ in 0..200 {
            if runner.status(&handle.task_id) == "Running OCR and analysis" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(runner.status(&handle.task_id), "Running OCR and analysis");

        tx.send(()).unwrap();
        assert_eq!(wait_for_final(&runner, &handle.task_id).await, "Complete");
    }

    #[tokio::test]
    async fn failing_task_records_error_message() {
        let runner = TaskRunner::in_memory();
        let handle = runner.submit(|_| async { Err(AvError::upstream("model overloaded")) });
        assert_eq!(
            wait_for_final(&runner, &handle.task_id).await,
            "Error: model overloaded"
        );
    }

    #[tokio::test]
    async fn tasks_get_distinct_ids() {
        let runner = TaskRunner::in_memory();
        let a = runner.submit(|_| async { Ok(()) });
        let b = runner.submit(|_| async { Ok(()) });
        assert_ne!(a.task_id, b.task_id);
    }
}
