//! FIFO queues of processes waiting for a backend.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::backend::BackendKind;
use crate::process::Process;

#[derive(Default)]
pub struct ProcessingQueue {
    items: Mutex<VecDeque<Process>>,
}

impl ProcessingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<Process>> {
        match self.items.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Processing queue lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn enqueue(&self, process: Process) {
        self.items().push_back(process);
    }

    pub fn dequeue(&self) -> Option<Process> {
        self.items().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }
}

/// One queue per backend kind.
#[derive(Default)]
pub struct Queues {
    local: ProcessingQueue,
    remote: ProcessingQueue,
    docker: ProcessingQueue,
}

impl Queues {
    pub fn get(&self, kind: BackendKind) -> &ProcessingQueue {
        match kind {
            BackendKind::Local => &self.local,
            BackendKind::Remote => &self.remote,
            BackendKind::Docker => &self.docker,
        }
    }
}
