//! Moves queued processes into execution.

use std::sync::{Arc, Mutex};

use crate::backend::BackendKind;
use crate::process::Process;
use crate::queue::processing::Queues;
use crate::statistics::Statistics;

pub struct Dispatcher {
    queues: Arc<Queues>,
    statistics: Arc<Statistics>,
    max_local: usize,
    admission: Mutex<()>,
}

impl Dispatcher {
    pub fn new(queues: Arc<Queues>, statistics: Arc<Statistics>, max_local: usize) -> Self {
        Self {
            queues,
            statistics,
            max_local,
            admission: Mutex::new(()),
        }
    }

    /// Dequeues every process of `kind` that may start now and registers it as
    /// running. Local admission stops at the concurrency ceiling.
    pub fn admit(&self, kind: BackendKind) -> Vec<Arc<Process>> {
        let _guard = match self.admission.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Dispatcher lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };

        let queue = self.queues.get(kind);
        let mut started = Vec::new();
        loop {
            if kind == BackendKind::Local && self.statistics.in_flight(kind) >= self.max_local {
                if !queue.is_empty() {
                    log::debug!(
                        "Local ceiling of {} reached, {} process(es) waiting",
                        self.max_local,
                        queue.len()
                    );
                }
                break;
            }
            let Some(process) = queue.dequeue() else {
                break;
            };
            started.push(self.statistics.start_recording(process));
        }
        started
    }
}
