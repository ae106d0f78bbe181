//! In-flight executions keyed by correlation token, plus persisted per-algorithm
//! runtime statistics.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::backend::BackendKind;
use crate::error::ServicesError;
use crate::process::{Process, ProcessStatus};
use crate::services::ServicesRegistry;
use crate::storage::StorageLayout;

#[derive(Debug, Clone)]
pub struct ExecutionEntry {
    pub token: String,
    pub started: Instant,
    pub request_path: String,
    pub backend: BackendKind,
    pub process: Arc<Process>,
}

/// A tracked execution that reached its terminal state.
#[derive(Debug, Clone)]
pub struct Settled {
    /// The process as it ended: `Handled` or `Failed`.
    pub process: Process,
    /// Seconds since `start_recording`.
    pub elapsed: f64,
}

pub struct Statistics {
    active: Mutex<HashMap<String, ExecutionEntry>>,
    services: Arc<ServicesRegistry>,
    layout: StorageLayout,
}

impl Statistics {
    pub fn new(services: Arc<ServicesRegistry>, layout: StorageLayout) -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
            services,
            layout,
        }
    }

    fn active(&self) -> MutexGuard<'_, HashMap<String, ExecutionEntry>> {
        match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Active executions lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Assigns a fresh token and callback URLs to `process` and tracks it as running.
    pub fn start_recording(&self, mut process: Process) -> Arc<Process> {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let (result_url, error_url) = self
            .layout
            .callback_urls(&process.algorithm_identifier, &token);

        process.id = Some(token.clone());
        process.remote_result_url = Some(result_url);
        process.remote_error_url = Some(error_url);
        process.status = ProcessStatus::Running;

        let process = Arc::new(process);
        let entry = ExecutionEntry {
            token: token.clone(),
            started: Instant::now(),
            request_path: process.request_path.clone(),
            backend: process.backend,
            process: Arc::clone(&process),
        };
        self.active().insert(token, entry);
        process
    }

    pub fn get_process(&self, token: &str) -> Option<Arc<Process>> {
        self.active().get(token).map(|e| Arc::clone(&e.process))
    }

    pub fn take(&self, token: &str) -> Option<ExecutionEntry> {
        self.active().remove(token)
    }

    /// Stops tracking `token` and stamps the process with its final `status`.
    fn settle(&self, token: &str, status: ProcessStatus) -> Option<Settled> {
        let entry = self.take(token)?;
        let mut process = Arc::unwrap_or_clone(entry.process);
        process.status = status;
        Some(Settled {
            process,
            elapsed: entry.started.elapsed().as_secs_f64(),
        })
    }

    /// Number of running executions on `kind`.
    pub fn in_flight(&self, kind: BackendKind) -> usize {
        self.active().values().filter(|e| e.backend == kind).count()
    }

    pub fn is_running(&self, request_path: &str) -> bool {
        self.active()
            .values()
            .any(|e| e.request_path == request_path)
    }

    /// Marks `token` handled and folds its runtime (seconds) into the
    /// algorithm's running average. `None` for unknown tokens.
    pub async fn end_recording(&self, token: &str) -> Result<Option<Settled>, ServicesError> {
        let Some(settled) = self.settle(token, ProcessStatus::Handled) else {
            return Ok(None);
        };
        let request_path = &settled.process.request_path;
        let stats = self
            .services
            .record_execution(request_path, settled.elapsed)
            .await?;
        if let Some(stats) = stats {
            log::debug!(
                "{} finished in {:.3}s (mean {:.3}s over {} runs)",
                request_path,
                settled.elapsed,
                stats.runtime,
                stats.executions
            );
        }
        Ok(Some(settled))
    }

    /// Marks a tracked execution failed without touching its statistics.
    pub fn remove_active_execution(&self, token: &str) -> Option<Settled> {
        self.settle(token, ProcessStatus::Failed)
    }

    /// Mean runtime in seconds, `-1` when the algorithm never finished a run.
    pub async fn mean_execution_time(&self, request_path: &str) -> Result<f64, ServicesError> {
        Ok(match self.services.statistics(request_path).await? {
            Some(stats) if stats.executions > 0 => stats.runtime,
            _ => -1.0,
        })
    }

    pub async fn number_of_executions(&self, request_path: &str) -> Result<u64, ServicesError> {
        Ok(self
            .services
            .statistics(request_path)
            .await?
            .map(|s| s.executions)
            .unwrap_or(0))
    }
}
