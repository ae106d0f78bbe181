//! Resolution of declared algorithm inputs against an execution request.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::config::EngineConfig;
use crate::error::ParameterError;
use crate::params::highlighter::Highlighter;
use crate::process::{DataElement, ExecutionRequest, Process};
use crate::services::DeclaredParam;
use crate::storage::StorageLayout;

const JSON_INPUT_FILE: &str = "jsonInput.json";

/// A stored data file referenced by a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataItem {
    /// `None` for direct absolute-path references.
    pub collection: Option<String>,
    pub filename: String,
    pub path: PathBuf,
    pub url: String,
}

impl DataItem {
    pub fn mime_type(&self) -> Option<String> {
        mime_guess::from_path(&self.path)
            .first()
            .map(|m| m.essence_str().to_string())
    }

    pub fn is_image(&self) -> bool {
        self.mime_type()
            .map(|m| m.starts_with("image/"))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Literal(String),
    /// Encoded highlighter; expands to several positional arguments.
    Highlighter(String),
    Data(DataItem),
}

impl ParamValue {
    /// Positional arguments for a local invocation.
    pub fn local_args(&self) -> Vec<String> {
        match self {
            ParamValue::Literal(v) => vec![v.clone()],
            ParamValue::Highlighter(v) => v.split_whitespace().map(str::to_string).collect(),
            ParamValue::Data(item) => vec![item.path.to_string_lossy().into_owned()],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchedParams {
    pub params: BTreeMap<String, ParamValue>,
    /// User-facing subset of `params` (reserved words excluded).
    pub output_params: BTreeMap<String, String>,
}

/// Values the engine supplies for reserved parameter names.
pub struct ReservedContext<'a> {
    pub reserved_words: &'a [String],
    pub root_url: &'a str,
    pub constants: &'a BTreeMap<String, String>,
    pub output_folder: &'a Path,
}

impl<'a> ReservedContext<'a> {
    pub fn new(config: &'a EngineConfig, output_folder: &'a Path) -> Self {
        Self {
            reserved_words: &config.reserved_words,
            root_url: &config.server.root_url,
            constants: &config.constants,
            output_folder,
        }
    }

    fn is_reserved(&self, name: &str) -> bool {
        self.reserved_words.iter().any(|w| w == name)
    }
}

pub fn match_params(
    needed: &[DeclaredParam],
    request: &ExecutionRequest,
    ctx: &ReservedContext<'_>,
) -> Result<MatchedParams, ParameterError> {
    let mut matched = MatchedParams::default();

    for param in needed {
        let name = param.name.as_str();

        if ctx.is_reserved(name) {
            match name {
                "highlighter" => {
                    let raw = request.highlighter().ok_or_else(|| {
                        ParameterError::InvalidHighlighter("request has no highlighter".to_string())
                    })?;
                    let encoded = Highlighter::from_value(raw)?.encode();
                    matched
                        .params
                        .insert(name.to_string(), ParamValue::Highlighter(encoded));
                }
                "host" => {
                    matched
                        .params
                        .insert(name.to_string(), ParamValue::Literal(ctx.root_url.to_string()));
                }
                "outputFolder" => {
                    matched.params.insert(
                        name.to_string(),
                        ParamValue::Literal(ctx.output_folder.to_string_lossy().into_owned()),
                    );
                }
                // Bound per process once the output slot is known.
                "resultFile" => {}
                _ => match ctx.constants.get(name) {
                    Some(value) => {
                        matched
                            .params
                            .insert(name.to_string(), ParamValue::Literal(value.clone()));
                    }
                    None => return Err(ParameterError::UnknownReserved(name.to_string())),
                },
            }
            continue;
        }

        match request.parameters.get(name).filter(|v| !v.is_null()) {
            Some(value) if param.kind == "json" => {
                let path = write_json_input(ctx.output_folder, value)?;
                let path = path.to_string_lossy().into_owned();
                matched
                    .params
                    .insert(name.to_string(), ParamValue::Literal(path.clone()));
                matched.output_params.insert(name.to_string(), path);
            }
            Some(value) => {
                let text = value_to_arg(value);
                matched
                    .params
                    .insert(name.to_string(), ParamValue::Literal(text.clone()));
                matched.output_params.insert(name.to_string(), text);
            }
            None if param.kind == "url" => {
                matched
                    .params
                    .insert(name.to_string(), ParamValue::Literal(String::new()));
                matched.output_params.insert(name.to_string(), String::new());
            }
            None => {
                log::debug!("Parameter '{}' not provided, left for order matching", name);
            }
        }
    }

    Ok(matched)
}

fn value_to_arg(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn write_json_input(folder: &Path, value: &Value) -> Result<PathBuf, ParameterError> {
    let path = folder.join(JSON_INPUT_FILE);
    let content = match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    };
    std::fs::create_dir_all(folder)
        .and_then(|_| std::fs::write(&path, content))
        .map_err(|e| ParameterError::WriteParameterFile {
            path: path.clone(),
            source: e,
        })?;
    Ok(path)
}

/// Resolves the data references of one request element onto `process.data`.
pub fn match_process_data(
    process: &mut Process,
    element: &DataElement,
    needed_data: &[DeclaredParam],
    layout: &StorageLayout,
) -> Result<(), ParameterError> {
    for (key, reference) in element {
        if !needed_data.iter().any(|d| &d.name == key) {
            return Err(ParameterError::UnnecessaryData(key.clone()));
        }
        let item = resolve_data_reference(reference, layout)?;
        process.data.insert(key.clone(), item);
    }

    let missing: Vec<String> = needed_data
        .iter()
        .filter(|d| !process.data.contains_key(&d.name))
        .map(|d| d.name.clone())
        .collect();
    if !missing.is_empty() {
        return Err(ParameterError::MissingData(missing));
    }

    Ok(())
}

fn resolve_data_reference(
    reference: &str,
    layout: &StorageLayout,
) -> Result<DataItem, ParameterError> {
    let direct = Path::new(reference);
    if direct.is_absolute() {
        if !direct.exists() {
            return Err(ParameterError::FileNotFound(direct.to_path_buf()));
        }
        return Ok(DataItem {
            collection: None,
            filename: direct
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: direct.to_path_buf(),
            url: layout.public_url(direct),
        });
    }

    let (collection, filename) = reference
        .split_once('/')
        .filter(|(c, f)| !c.is_empty() && !f.is_empty() && !f.contains('/'))
        .ok_or_else(|| ParameterError::InvalidDataReference(reference.to_string()))?;

    let path = layout.data_file(collection, filename);
    if !path.exists() {
        return Err(ParameterError::FileNotFound(path));
    }

    Ok(DataItem {
        collection: Some(collection.to_string()),
        filename: filename.to_string(),
        url: layout.data_url(collection, filename),
        path,
    })
}

/// Fills `process.matched_parameters` in executable argument order.
pub fn match_order(
    process: &mut Process,
    param_order: &[DeclaredParam],
) -> Result<(), ParameterError> {
    let mut ordered = Vec::with_capacity(param_order.len());
    for param in param_order {
        let value = process
            .lookup(&param.name)
            .ok_or_else(|| ParameterError::UnmatchedParameter(param.name.clone()))?;
        ordered.push((param.name.clone(), value));
    }
    process.matched_parameters = ordered;
    Ok(())
}

/// Expands `"collection/*"` references into one element per stored file.
pub fn expand_data_wildcards(
    data: Vec<DataElement>,
    layout: &StorageLayout,
) -> Result<Vec<DataElement>, ParameterError> {
    let mut expanded = Vec::with_capacity(data.len());
    let mut pending: Vec<DataElement> = data.into_iter().rev().collect();

    while let Some(element) = pending.pop() {
        let wildcard = element
            .iter()
            .find_map(|(key, value)| value.strip_suffix("/*").map(|c| (key.clone(), c.to_string())));

        let Some((key, collection)) = wildcard else {
            expanded.push(element);
            continue;
        };

        let files = list_collection_files(&collection, layout)?;
        // Keep order: later elements are pushed first so the first file pops next.
        for filename in files.into_iter().rev() {
            let mut copy = element.clone();
            copy.insert(key.clone(), format!("{}/{}", collection, filename));
            pending.push(copy);
        }
    }

    Ok(expanded)
}

fn list_collection_files(
    collection: &str,
    layout: &StorageLayout,
) -> Result<Vec<String>, ParameterError> {
    let pattern_path = layout.collection_files_folder(collection).join("*");
    let pattern = pattern_path.to_string_lossy().into_owned();
    let wildcard_error = |reason: String| ParameterError::Wildcard {
        pattern: format!("{}/*", collection),
        reason,
    };

    let mut files = Vec::new();
    for entry in glob::glob(&pattern).map_err(|e| wildcard_error(e.to_string()))? {
        let path = entry.map_err(|e| wildcard_error(e.to_string()))?;
        if path.is_file() {
            if let Some(name) = path.file_name() {
                files.push(name.to_string_lossy().into_owned());
            }
        }
    }
    files.sort();

    if files.is_empty() {
        return Err(wildcard_error("collection has no files".to_string()));
    }
    Ok(files)
}
