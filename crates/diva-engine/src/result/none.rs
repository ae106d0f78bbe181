use serde_json::Value;

use crate::error::ResultError;
use crate::process::Process;
use crate::storage::filesystem;

/// The algorithm produces no document; drop the placeholder and any partial output.
pub(crate) fn handle_result(process: &Process) -> Result<Option<Value>, ResultError> {
    if let Some(result_file) = &process.result_file {
        filesystem::remove_file_if_exists(result_file)?;
    }
    filesystem::remove_file_if_exists(&process.tmp_result_file)?;
    Ok(None)
}
