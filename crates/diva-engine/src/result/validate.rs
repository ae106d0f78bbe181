use serde_json::Value;

use crate::error::ResultError;

const RESULT_SCHEMA_JSON: &str = include_str!("../../schema/result-v1.json");

/// Checks a finished result document against the response schema.
pub fn validate_result(document: &Value) -> Result<(), ResultError> {
    let schema: Value = serde_json::from_str(RESULT_SCHEMA_JSON)
        .map_err(|e| ResultError::Schema(format!("Invalid embedded schema JSON: {}", e)))?;

    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| ResultError::Schema(format!("Failed to compile JSON schema: {}", e)))?;

    let errors: Vec<String> = validator
        .iter_errors(document)
        .map(|e| e.to_string())
        .collect();
    if !errors.is_empty() {
        return Err(ResultError::Schema(errors.join("; ")));
    }

    Ok(())
}
