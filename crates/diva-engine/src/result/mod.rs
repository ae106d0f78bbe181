//! Turning executable output into stored result documents.

mod console;
pub mod document;
mod file;
mod none;
pub mod validate;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ResultError;
use crate::process::Process;
use crate::storage::StorageLayout;

pub use document::{ErrorDocument, ResultDocument};
pub use validate::validate_result;

/// What an algorithm's executable produces, as declared in its descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Console,
    File,
    None,
}

/// Handler bound to a process at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultHandler {
    Console,
    File,
    None,
}

impl ResultHandler {
    pub fn for_kind(kind: ResultKind) -> Self {
        match kind {
            ResultKind::Console => Self::Console,
            ResultKind::File => Self::File,
            ResultKind::None => Self::None,
        }
    }

    /// Whether the executable is told where to write its result (`resultFile`).
    pub fn writes_result_file(&self) -> bool {
        matches!(self, Self::File)
    }

    /// Processes a finished execution. Anything on stderr fails the job.
    pub fn handle_result(
        &self,
        stdout: &str,
        stderr: &str,
        process: &Process,
        layout: &StorageLayout,
    ) -> Result<Option<Value>, ResultError> {
        if !stderr.trim().is_empty() {
            return Err(ResultError::Stderr(stderr.trim().to_string()));
        }

        let _span = tracing::info_span!(
            "handle_result",
            method = %process.method,
            folder = %process.method_folder
        )
        .entered();
        match self {
            Self::Console => console::handle_result(stdout, process, layout),
            Self::File => file::handle_result(process, layout),
            Self::None => none::handle_result(process),
        }
    }

    /// Writes the 500 error document for `process`.
    pub fn handle_error(&self, message: &str, process: &Process) -> Result<(), ResultError> {
        log::error!(
            "{} failed for {}/{}: {}",
            process.method,
            process.root_folder,
            process.method_folder,
            message
        );
        document::write_error_document(process, message)
    }

    /// A CWL run leaves its document in the temp result file of the output folder.
    pub fn handle_cwl_result(
        &self,
        process: &Process,
        layout: &StorageLayout,
    ) -> Result<Option<Value>, ResultError> {
        if !process.tmp_result_file.exists() && *self != Self::None {
            return Err(ResultError::ReadResult {
                path: process.tmp_result_file.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "CWL run produced no result",
                ),
            });
        }
        self.handle_result("", "", process, layout)
    }

    /// Fails the process with the contents of its error log.
    pub fn handle_cwl_error(&self, process: &Process) -> Result<(), ResultError> {
        let message = match std::fs::read_to_string(&process.log_files.err) {
            Ok(content) if !content.trim().is_empty() => content.trim().to_string(),
            Ok(_) => "CWL execution failed".to_string(),
            Err(e) => {
                log::warn!(
                    "Could not read error log {}: {}",
                    process.log_files.err.display(),
                    e
                );
                "CWL execution failed".to_string()
            }
        };
        self.handle_error(&message, process)
    }
}
