//! Task lifecycle: at most one task runs per process.
//!
//! The service owns a single running slot. Starting while it is occupied
//! fails with `task.busy`; stopping is cooperative and takes effect at the
//! orchestrator's next between-steps check. Completion clearing is guarded
//! by the task id so an out-of-order completion cannot stomp a newer task.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use super::orchestrator::{CancellationProbe, RuntimeTask};
use crate::error::CoreError;
use crate::util::now_millis;

struct RunningRecord {
    task_id: String,
    correlation_id: String,
    started_at: i64,
    stop_requested: Arc<AtomicBool>,
}

/// Public view of the running slot.
#[derive(Debug, Clone)]
pub struct RunningTaskInfo {
    pub task_id: String,
    pub correlation_id: String,
    pub started_at: i64,
}

/// Single-flight task runner.
pub struct AgentService {
    running: Arc<Mutex<Option<RunningRecord>>>,
}

impl AgentService {
    pub fn new() -> Self {
        Self {
            running: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .expect("running slot lock poisoned")
            .is_some()
    }

    pub fn running_task(&self) -> Option<RunningTaskInfo> {
        self.running
            .lock()
            .expect("running slot lock poisoned")
            .as_ref()
            .map(|record| RunningTaskInfo {
                task_id: record.task_id.clone(),
                correlation_id: record.correlation_id.clone(),
                started_at: record.started_at,
            })
    }

    /// Run `task` through `run`, enforcing the single-flight invariant.
    ///
    /// `run` receives a cancellation probe that reports true once the slot
    /// is cleared, holds a different task, or a stop was requested.
    pub async fn start<F, Fut, T>(&self, task: &RuntimeTask, run: F) -> Result<T, CoreError>
    where
        F: FnOnce(CancellationProbe) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let stop_requested = Arc::new(AtomicBool::new(false));
        {
            let mut slot = self.running.lock().expect("running slot lock poisoned");
            if slot.is_some() {
                return Err(CoreError::Busy);
            }
            *slot = Some(RunningRecord {
                task_id: task.task_id.clone(),
                correlation_id: task.correlation_id.clone(),
                started_at: now_millis(),
                stop_requested: stop_requested.clone(),
            });
        }
        tracing::info!(task = %task.task_id, correlation = %task.correlation_id, "task started");

        let probe: CancellationProbe = {
            let running = self.running.clone();
            let task_id = task.task_id.clone();
            let stop_requested = stop_requested.clone();
            Arc::new(move || {
                if stop_requested.load(Ordering::SeqCst) {
                    return true;
                }
                let slot = running.lock().expect("running slot lock poisoned");
                match slot.as_ref() {
                    None => true,
                    Some(record) => record.task_id != task_id,
                }
            })
        };

        let result = run(probe).await;

        {
            let mut slot = self.running.lock().expect("running slot lock poisoned");
            // Only clear our own record; a newer task may own the slot.
            if slot.as_ref().is_some_and(|record| record.task_id == task.task_id) {
                *slot = None;
            }
        }
        tracing::info!(task = %task.task_id, ok = result.is_ok(), "task finished");
        result
    }

    /// Request a cooperative stop of the running task.
    ///
    /// With a `correlation_id`, only a matching task is stopped. Returns
    /// whether a stop was actually requested.
    pub fn request_stop(&self, correlation_id: Option<&str>) -> bool {
        let slot = self.running.lock().expect("running slot lock poisoned");
        let Some(record) = slot.as_ref() else {
            return false;
        };
        if let Some(correlation_id) = correlation_id
            && correlation_id != record.correlation_id
        {
            return false;
        }
        record.stop_requested.store(true, Ordering::SeqCst);
        tracing::info!(task = %record.task_id, "stop requested");
        true
    }
}

impl Default for AgentService {
    fn default() -> Self {
        Self::new()
    }
}
