use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::backend::BackendKind;
use crate::error::StorageError;
use crate::params::fingerprint;
use crate::params::matcher::{DataItem, MatchedParams, ParamValue};
use crate::process::collection::Collection;
use crate::process::request::{DataElement, ExecutionType};
use crate::result::ResultHandler;
use crate::services::{AlgorithmDescriptor, ExecutableType};
use crate::storage::{filesystem, LogFiles, StorageLayout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Created,
    Queued,
    Running,
    Handled,
    Failed,
}

/// One schedulable execution of an algorithm on one data element.
#[derive(Debug, Clone)]
pub struct Process {
    /// Correlation token, assigned when execution starts.
    pub id: Option<String>,
    pub algorithm_identifier: String,
    pub request_path: String,
    pub method: String,
    pub cache_method: String,
    pub executable_type: ExecutableType,
    pub executable_path: PathBuf,
    pub root_folder: String,
    pub output_folder: PathBuf,
    pub method_folder: String,
    /// Collection-level parameters, with per-process values substituted.
    pub parameters: MatchedParams,
    pub data: BTreeMap<String, DataItem>,
    pub input_data: DataElement,
    pub input_parameters: Value,
    pub input_highlighters: Value,
    /// Positional arguments in executable order.
    pub matched_parameters: Vec<(String, ParamValue)>,
    pub result_handler: ResultHandler,
    pub result_file: Option<PathBuf>,
    pub tmp_result_file: PathBuf,
    pub result_link: String,
    pub remote_result_url: Option<String>,
    pub remote_error_url: Option<String>,
    pub execution_type: ExecutionType,
    pub backend: BackendKind,
    pub image_name: Option<String>,
    pub log_files: LogFiles,
    pub yaml_file: PathBuf,
    pub cwl_file: PathBuf,
    pub remote_paths: BTreeMap<String, String>,
    pub output_collection: String,
    pub identification: Option<Value>,
    pub fingerprint: String,
    pub data_hash: String,
    pub parameters_hash: String,
    pub no_cache: bool,
    pub status: ProcessStatus,
}

impl Process {
    pub fn new(
        collection: &Collection,
        descriptor: &AlgorithmDescriptor,
        index: usize,
        element: DataElement,
        layout: &StorageLayout,
        now: DateTime<Utc>,
    ) -> Self {
        let output_folder = layout.process_output_folder(&collection.name, index);
        let method_folder = format!("data_{}", index);
        let planned = StorageLayout::result_file(&output_folder, &method_folder);
        let result_handler = ResultHandler::for_kind(descriptor.output);

        let mut parameters = collection.parameters.clone();
        if parameters.params.contains_key("outputFolder") {
            parameters.params.insert(
                "outputFolder".to_string(),
                ParamValue::Literal(output_folder.to_string_lossy().into_owned()),
            );
        }
        if result_handler.writes_result_file() {
            parameters.params.insert(
                "resultFile".to_string(),
                ParamValue::Literal(planned.to_string_lossy().into_owned()),
            );
        }

        let data_value = serde_json::to_value(&element).unwrap_or(Value::Null);

        Self {
            id: None,
            algorithm_identifier: descriptor.identifier.clone(),
            request_path: collection.request_path.clone(),
            method: descriptor.service.clone(),
            cache_method: descriptor.method_name(),
            executable_type: descriptor.executable_type,
            executable_path: descriptor.executable_path.clone(),
            root_folder: collection.name.clone(),
            tmp_result_file: StorageLayout::temp_result_file(&output_folder, &method_folder),
            result_link: layout.static_result_url(&planned),
            log_files: StorageLayout::log_files(&collection.log_folder, &method_folder, now),
            yaml_file: output_folder.join(format!("{}.yaml", method_folder)),
            cwl_file: layout.cwl_file(&descriptor.path, &descriptor.identifier),
            output_folder,
            method_folder,
            parameters,
            data: BTreeMap::new(),
            fingerprint: fingerprint::fingerprint(
                &collection.input_parameters,
                &collection.input_highlighters,
                &data_value,
            ),
            data_hash: fingerprint::hash_value(&data_value),
            parameters_hash: fingerprint::hash_value(&collection.input_parameters),
            input_data: element,
            input_parameters: collection.input_parameters.clone(),
            input_highlighters: collection.input_highlighters.clone(),
            matched_parameters: Vec::new(),
            result_handler,
            result_file: None,
            remote_result_url: None,
            remote_error_url: None,
            execution_type: collection.execution_type,
            backend: descriptor.execute,
            image_name: descriptor.image_name.clone(),
            remote_paths: descriptor.remote_path_map(),
            output_collection: collection.output_collection.clone(),
            identification: collection.identification.clone(),
            no_cache: descriptor.no_cache,
            status: ProcessStatus::Created,
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn is_test(&self) -> bool {
        self.execution_type == ExecutionType::Test
    }

    pub fn planned_result_file(&self) -> PathBuf {
        StorageLayout::result_file(&self.output_folder, &self.method_folder)
    }

    /// Creates the output folder and writes the `planned` placeholder result.
    pub fn reserve_output(&mut self, layout: &StorageLayout) -> Result<(), StorageError> {
        filesystem::ensure_directory(&self.output_folder)?;
        let result_file = self.planned_result_file();
        filesystem::write_json(&result_file, &serde_json::json!({ "status": "planned" }))?;

        self.tmp_result_file = StorageLayout::temp_result_file(&self.output_folder, &self.method_folder);
        self.result_link = layout.static_result_url(&result_file);
        self.result_file = Some(result_file);
        Ok(())
    }

    /// Points this process at a previously computed result.
    pub fn bind_cached(&mut self, result_file: PathBuf, layout: &StorageLayout) {
        if let Some(folder) = result_file.parent() {
            self.output_folder = folder.to_path_buf();
        }
        if let Some(stem) = result_file.file_stem() {
            self.method_folder = stem.to_string_lossy().into_owned();
        }
        self.tmp_result_file = StorageLayout::temp_result_file(&self.output_folder, &self.method_folder);
        self.result_link = layout.static_result_url(&result_file);
        self.result_file = Some(result_file);
        self.status = ProcessStatus::Handled;
    }

    /// First data item that looks like an image.
    pub fn input_image(&self) -> Option<&DataItem> {
        self.data.values().find(|item| item.is_image())
    }

    /// Resolved value of a named input: collection parameters first, then data.
    pub fn lookup(&self, name: &str) -> Option<ParamValue> {
        if let Some(value) = self.parameters.params.get(name) {
            return Some(value.clone());
        }
        self.data.get(name).cloned().map(ParamValue::Data)
    }
}
