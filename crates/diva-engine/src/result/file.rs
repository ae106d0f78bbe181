//! Structured results whose `output` list may embed files.

use std::path::Path;
use std::sync::LazyLock;

use base64::Engine as _;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::ResultError;
use crate::process::Process;
use crate::result::document::{read_written_result, write_document, ResultDocument};
use crate::storage::{filesystem, StorageLayout};

static RE_UNSAFE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileOutput {
    #[serde(rename = "mime-type", alias = "mimetype")]
    mime_type: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default)]
    options: FileOptions,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FileOptions {
    #[serde(default, deserialize_with = "lenient_bool")]
    visualization: bool,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Accepts `true`, `"true"`, `1` and friends; some executables emit strings.
fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::String(s) => {
            let s = s.trim().to_ascii_lowercase();
            !(s.is_empty() || s == "false" || s == "0")
        }
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        _ => false,
    })
}

pub(crate) fn handle_result(
    process: &Process,
    layout: &StorageLayout,
) -> Result<Option<Value>, ResultError> {
    let raw = read_written_result(process)?;
    let mut document = ResultDocument::parse(raw)?;

    let mut has_visualization = false;
    for entry in document.output.iter_mut() {
        let Some(file_value) = entry.get_mut("file") else {
            continue;
        };
        let mut file: FileOutput = serde_json::from_value(file_value.take())?;
        persist_asset(&mut file, &process.output_folder, layout)?;
        has_visualization |= file.options.visualization;
        *file_value = serde_json::to_value(&file)?;
    }

    if !has_visualization {
        if let Some(image) = process.input_image() {
            document.output.push(serde_json::json!({
                "file": {
                    "mime-type": image.mime_type().unwrap_or_else(|| "image/png".to_string()),
                    "name": image.filename,
                    "url": image.url,
                    "options": { "visualization": true, "type": "image" }
                }
            }));
        }
    }

    document.finalize(process, layout);
    write_document(process, &document).map(Some)
}

/// Decodes inline content to the output folder and replaces it with a URL.
fn persist_asset(
    file: &mut FileOutput,
    output_folder: &Path,
    layout: &StorageLayout,
) -> Result<(), ResultError> {
    let Some(content) = file.content.take() else {
        return Ok(());
    };

    let name = asset_file_name(&file.name, &file.mime_type);
    let bytes = if file.mime_type == "text/plain" {
        content.into_bytes()
    } else {
        let encoded = strip_data_url(&content);
        base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| ResultError::DecodeAsset {
                name: file.name.clone(),
                reason: e.to_string(),
            })?
    };

    let path = output_folder.join(&name);
    filesystem::write_atomic(&path, &bytes)?;
    log::debug!("Stored output asset {}", path.display());

    file.url = Some(layout.static_result_url(&path));
    Ok(())
}

fn strip_data_url(content: &str) -> &str {
    match content.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map(|(_, data)| data).unwrap_or(rest),
        None => content,
    }
}

/// File-system safe asset name with an extension matching `mime_type`.
pub(crate) fn asset_file_name(name: &str, mime_type: &str) -> String {
    let cleaned = RE_UNSAFE_NAME.replace_all(name.trim(), "_");
    let cleaned = cleaned.trim_start_matches('.');
    let base = if cleaned.is_empty() { "output" } else { cleaned };

    if Path::new(base).extension().is_some() {
        return base.to_string();
    }
    match mime_guess::get_mime_extensions_str(mime_type).and_then(|exts| exts.first()) {
        Some(ext) => format!("{}.{}", base, ext),
        None => base.to_string(),
    }
}
