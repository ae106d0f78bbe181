//! Stored result documents.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ResultError;
use crate::process::Process;
use crate::storage::{filesystem, StorageLayout};

/// Finalized success document served at a process's result link.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultDocument {
    #[serde(default)]
    pub output: Vec<Value>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub result_link: String,
    #[serde(default)]
    pub collection_name: String,
    #[serde(default)]
    pub result_zip_link: String,
    /// Algorithm-specific top-level fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResultDocument {
    pub fn parse(value: Value) -> Result<Self, ResultError> {
        let mut value = value;
        // Some executables emit `"output": null`.
        if let Some(obj) = value.as_object_mut() {
            if obj.get("output").is_some_and(Value::is_null) {
                obj.remove("output");
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn finalize(&mut self, process: &Process, layout: &StorageLayout) {
        self.status = "done".to_string();
        self.result_link = process.result_link.clone();
        self.collection_name = process.root_folder.clone();
        self.result_zip_link = layout.zip_link(&process.root_folder, &process.method_folder);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDocument {
    pub status: String,
    pub result_link: String,
    pub collection_name: String,
    pub status_message: String,
    pub status_code: u16,
}

impl ErrorDocument {
    pub fn for_process(process: &Process, message: &str) -> Self {
        Self {
            status: "done".to_string(),
            result_link: process.result_link.clone(),
            collection_name: process.root_folder.clone(),
            status_message: message.to_string(),
            status_code: 500,
        }
    }
}

pub(crate) fn result_file(process: &Process) -> Result<PathBuf, ResultError> {
    process
        .result_file
        .clone()
        .ok_or(ResultError::MissingResultFile)
}

/// Reads the raw document an execution produced: the temp file when present,
/// otherwise `stdout`, otherwise the result file itself.
pub(crate) fn read_raw_result(process: &Process, stdout: &str) -> Result<Value, ResultError> {
    if process.tmp_result_file.exists() {
        return read_json_file(&process.tmp_result_file);
    }
    if !stdout.trim().is_empty() {
        return Ok(serde_json::from_str(stdout)?);
    }
    read_json_file(&result_file(process)?)
}

/// Like [`read_raw_result`] but ignores `stdout`, which file-output
/// executables are free to use for progress messages.
pub(crate) fn read_written_result(process: &Process) -> Result<Value, ResultError> {
    if process.tmp_result_file.exists() {
        return read_json_file(&process.tmp_result_file);
    }
    read_json_file(&result_file(process)?)
}

fn read_json_file(path: &std::path::Path) -> Result<Value, ResultError> {
    let content = std::fs::read(path).map_err(|e| ResultError::ReadResult {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(serde_json::from_slice(&content)?)
}

pub(crate) fn write_document(process: &Process, document: &ResultDocument) -> Result<Value, ResultError> {
    let path = result_file(process)?;
    let value = serde_json::to_value(document)?;
    filesystem::write_json(&path, &value)?;
    filesystem::remove_file_if_exists(&process.tmp_result_file)?;
    Ok(value)
}

/// Writes the 500 status document and drops any partial output.
pub(crate) fn write_error_document(process: &Process, message: &str) -> Result<(), ResultError> {
    let path = result_file(process)?;
    filesystem::write_json(&path, &ErrorDocument::for_process(process, message))?;
    filesystem::remove_file_if_exists(&process.tmp_result_file)?;
    Ok(())
}
