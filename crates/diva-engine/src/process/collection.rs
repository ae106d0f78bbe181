use std::path::PathBuf;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::params::matcher::MatchedParams;
use crate::process::process::Process;
use crate::process::request::{DataElement, ExecutionRequest, ExecutionType};
use crate::storage::StorageLayout;

/// A batch of processes created from one request.
#[derive(Debug, Clone)]
pub struct Collection {
    pub name: String,
    pub method: String,
    pub request_path: String,
    pub output_folder: PathBuf,
    pub result_file: PathBuf,
    pub result_link: String,
    pub log_folder: PathBuf,
    pub parameters: MatchedParams,
    pub input_parameters: Value,
    pub input_highlighters: Value,
    pub input_data: Vec<DataElement>,
    pub identification: Option<Value>,
    pub output_collection: String,
    pub execution_type: ExecutionType,
    pub processes: Vec<Process>,
}

impl Collection {
    pub fn new(
        method: &str,
        request_path: &str,
        request: &ExecutionRequest,
        execution_type: ExecutionType,
        layout: &StorageLayout,
    ) -> Self {
        let name = generate_collection_name();
        let result_file = layout.collection_result_file(&name);
        Self {
            method: method.to_string(),
            request_path: request_path.to_string(),
            output_folder: layout.collection_output_folder(&name),
            result_link: layout.static_result_url(&result_file),
            result_file,
            log_folder: layout.log_folder(request_path),
            parameters: MatchedParams::default(),
            input_parameters: request.plain_parameters(),
            input_highlighters: request.highlighters_value(),
            input_data: request.data.clone(),
            identification: request.identification.clone(),
            output_collection: String::new(),
            execution_type,
            processes: Vec::new(),
            name,
        }
    }

    pub fn response(&self, layout: &StorageLayout) -> CollectionResponse {
        CollectionResponse {
            results: self
                .processes
                .iter()
                .map(|p| ProcessLink {
                    hash: p.fingerprint.clone(),
                    result_link: p.result_link.clone(),
                })
                .collect(),
            result_collection: self.output_collection.clone(),
            result_collection_link: layout.collection_link(&self.output_collection),
            result_link: self.result_link.clone(),
            message: "This url is available for 24 hours".to_string(),
            status: "done".to_string(),
            status_code: 202,
        }
    }
}

/// Random collection name.
pub fn generate_collection_name() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// `<inputCollection>_<service>_<Y>_<M>_<D>_<h>_<m>_<s>`
pub fn output_collection_name(input_collection: &str, service: &str, now: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}_{}_{}_{}_{}_{}",
        input_collection,
        service,
        now.year(),
        now.month(),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessLink {
    pub hash: String,
    pub result_link: String,
}

/// Immediate answer to a submitted request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionResponse {
    pub results: Vec<ProcessLink>,
    pub result_collection: String,
    pub result_collection_link: String,
    pub result_link: String,
    pub message: String,
    pub status: String,
    pub status_code: u16,
}
