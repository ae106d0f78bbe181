use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One element of the request's `data` list: declared data key to reference.
pub type DataElement = BTreeMap<String, String>;

/// Parsed body of an execution request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionRequest {
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub data: Vec<DataElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identification: Option<Value>,
}

impl ExecutionRequest {
    pub fn highlighter(&self) -> Option<&Value> {
        self.parameters.get("highlighter").filter(|v| !v.is_null())
    }

    /// Highlighter as stored in cache records; `{}` when none was sent.
    pub fn highlighters_value(&self) -> Value {
        self.highlighter()
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    /// Request parameters without the highlighter.
    pub fn plain_parameters(&self) -> Value {
        let mut params = self.parameters.clone();
        params.remove("highlighter");
        Value::Object(params)
    }

    /// Collection of the first referenced data item, used to name the output
    /// collection.
    pub fn input_collection_name(&self) -> Option<String> {
        let first = self.data.first()?.values().next()?;
        let trimmed = first.trim_start_matches('/');
        trimmed
            .split('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionType {
    #[default]
    Regular,
    /// Validation run after registration; results are checked and discarded.
    Test,
}
