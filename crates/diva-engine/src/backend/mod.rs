//! Execution backends: where and how a process actually runs.

pub mod command;
pub mod cwl;
pub mod docker;
pub mod local;
pub mod remote;
pub mod ssh;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::ExecutionError;
use crate::process::Process;

pub use command::CommandOutput;
pub use cwl::CwlBackend;
pub use docker::DockerBackend;
pub use local::LocalBackend;
pub use remote::RemoteBackend;
pub use ssh::SshSession;

/// Queue an algorithm's processes go to, as declared in its descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Remote,
    Docker,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Local => write!(f, "local"),
            BackendKind::Remote => write!(f, "remote"),
            BackendKind::Docker => write!(f, "docker"),
        }
    }
}

/// Concrete executor a queued process is handed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    Local,
    Remote,
    DockerLocal,
    DockerSsh,
}

impl ExecutorKind {
    pub fn for_backend(kind: BackendKind, cwl_support: bool) -> Self {
        match kind {
            BackendKind::Local => ExecutorKind::Local,
            BackendKind::Remote => ExecutorKind::Remote,
            BackendKind::Docker if cwl_support => ExecutorKind::DockerSsh,
            BackendKind::Docker => ExecutorKind::DockerLocal,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExecutorKind::Local => "local",
            ExecutorKind::Remote => "remote",
            ExecutorKind::DockerLocal => "docker",
            ExecutorKind::DockerSsh => "cwl",
        }
    }
}

/// Output of an execution that ran to completion in-process.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl From<CommandOutput> for ProcessOutput {
    fn from(output: CommandOutput) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// Output is ready for the bound result handler.
    Finished(ProcessOutput),
    /// The job reports back through the callback endpoints.
    Detached,
    /// A CWL run left its result in the output folder.
    Workflow,
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn execute(&self, process: &Process) -> Result<Completion, ExecutionError>;

    /// Releases resources held for a finished job.
    async fn clean_up(&self, _process: &Process) -> Result<(), ExecutionError> {
        Ok(())
    }
}

/// One backend per executor; executors without configuration stay empty.
#[derive(Clone, Default)]
pub struct Backends {
    local: Option<Arc<dyn Backend>>,
    remote: Option<Arc<dyn Backend>>,
    docker_local: Option<Arc<dyn Backend>>,
    docker_ssh: Option<Arc<dyn Backend>>,
}

impl Backends {
    pub fn from_config(config: &EngineConfig) -> Self {
        let max_output = config.local.max_buffer_bytes;
        let mut backends = Self::default()
            .with(ExecutorKind::Local, Arc::new(LocalBackend::new(&config.local)))
            .with(
                ExecutorKind::DockerLocal,
                Arc::new(DockerBackend::new(config.docker.clone(), max_output)),
            );

        if let Some(remote) = &config.remote {
            backends = backends.with(ExecutorKind::Remote, Arc::new(RemoteBackend::new(remote, max_output)));
        }
        if let Some(cwl) = &config.cwl {
            backends = backends.with(ExecutorKind::DockerSsh, Arc::new(CwlBackend::new(cwl, max_output)));
        }
        backends
    }

    pub fn with(mut self, kind: ExecutorKind, backend: Arc<dyn Backend>) -> Self {
        let slot = match kind {
            ExecutorKind::Local => &mut self.local,
            ExecutorKind::Remote => &mut self.remote,
            ExecutorKind::DockerLocal => &mut self.docker_local,
            ExecutorKind::DockerSsh => &mut self.docker_ssh,
        };
        *slot = Some(backend);
        self
    }

    pub fn resolve(&self, kind: ExecutorKind) -> Result<Arc<dyn Backend>, ExecutionError> {
        let slot = match kind {
            ExecutorKind::Local => &self.local,
            ExecutorKind::Remote => &self.remote,
            ExecutorKind::DockerLocal => &self.docker_local,
            ExecutorKind::DockerSsh => &self.docker_ssh,
        };
        slot.clone()
            .ok_or(ExecutionError::BackendNotConfigured(kind.name()))
    }
}

/// Result and error callback URLs of a started process.
pub(crate) fn callback_urls(process: &Process) -> Result<(&str, &str), ExecutionError> {
    match (&process.remote_result_url, &process.remote_error_url) {
        (Some(result), Some(error)) => Ok((result, error)),
        _ => Err(ExecutionError::NotStarted),
    }
}
