//! Algorithm descriptors as stored in the services file.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::backend::BackendKind;
use crate::result::ResultKind;

/// One declared input: a single-key map `{name: type}` on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, String>",
    into = "BTreeMap<String, String>"
)]
pub struct DeclaredParam {
    pub name: String,
    pub kind: String,
}

impl DeclaredParam {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
        }
    }
}

impl TryFrom<BTreeMap<String, String>> for DeclaredParam {
    type Error = String;

    fn try_from(map: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        if map.len() != 1 {
            return Err(format!(
                "declared parameter must have exactly one key, found {}",
                map.len()
            ));
        }
        let (name, kind) = map
            .into_iter()
            .next()
            .ok_or_else(|| "empty declared parameter".to_string())?;
        Ok(Self { name, kind })
    }
}

impl From<DeclaredParam> for BTreeMap<String, String> {
    fn from(param: DeclaredParam) -> Self {
        BTreeMap::from([(param.name, param.kind)])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutableType {
    Java,
    #[serde(alias = "coffee")]
    Coffeescript,
    Python,
    #[serde(alias = "Rscript", alias = "r")]
    Rscript,
    Bash,
    Matlab,
    Binary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStatistics {
    pub runtime: f64,
    pub executions: u64,
}

impl Default for ExecutionStatistics {
    fn default() -> Self {
        Self {
            runtime: -1.0,
            executions: 0,
        }
    }
}

impl ExecutionStatistics {
    /// Folds one more run into the cumulative moving average.
    pub fn record(&mut self, elapsed: f64) {
        if self.executions == 0 {
            self.executions = 1;
            self.runtime = elapsed;
        } else {
            let n = self.executions as f64;
            self.runtime = (elapsed + n * self.runtime) / (n + 1.0);
            self.executions += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub status_code: i32,
    pub status_message: String,
}

impl Default for ServiceStatus {
    fn default() -> Self {
        Self {
            status_code: -1,
            status_message: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionRecord {
    pub date: String,
    pub error_message: String,
}

/// Availability states written by test executions.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceState {
    Ok,
    Error(String),
}

impl ServiceState {
    pub fn to_status(&self) -> ServiceStatus {
        match self {
            ServiceState::Ok => ServiceStatus {
                status_code: 200,
                status_message: "Algorithm is Available".to_string(),
            },
            ServiceState::Error(message) => ServiceStatus {
                status_code: 500,
                status_message: format!("Error: {}", message),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmDescriptor {
    pub service: String,
    pub identifier: String,
    pub path: String,
    pub executable_path: PathBuf,
    pub output: ResultKind,
    pub execute: BackendKind,
    pub executable_type: ExecutableType,
    #[serde(rename = "image_name", default, skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
    #[serde(default)]
    pub parameters: Vec<DeclaredParam>,
    #[serde(default)]
    pub data: Vec<DeclaredParam>,
    #[serde(default)]
    pub param_order: Vec<DeclaredParam>,
    /// Parameter values to use on the execution host instead of local paths.
    #[serde(default)]
    pub remote_paths: Vec<DeclaredParam>,
    #[serde(default)]
    pub no_cache: bool,
    #[serde(default)]
    pub status: ServiceStatus,
    #[serde(default)]
    pub statistics: ExecutionStatistics,
    #[serde(default)]
    pub exceptions: Vec<ExceptionRecord>,
    /// Registration metadata the engine does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AlgorithmDescriptor {
    /// Name used for the per-algorithm cache file.
    pub fn method_name(&self) -> String {
        self.path.replace('/', "")
    }

    pub fn remote_path_map(&self) -> BTreeMap<String, String> {
        self.remote_paths
            .iter()
            .map(|p| (p.name.clone(), p.kind.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicesFile {
    #[serde(default)]
    pub services: Vec<AlgorithmDescriptor>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ServicesFile {
    pub fn by_path(&self, path: &str) -> Option<&AlgorithmDescriptor> {
        self.services.iter().find(|s| s.path == path)
    }

    pub fn by_path_mut(&mut self, path: &str) -> Option<&mut AlgorithmDescriptor> {
        self.services.iter_mut().find(|s| s.path == path)
    }

    pub fn by_identifier_mut(&mut self, identifier: &str) -> Option<&mut AlgorithmDescriptor> {
        self.services.iter_mut().find(|s| s.identifier == identifier)
    }
}
