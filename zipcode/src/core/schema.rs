//! JSON Schema conformance checks for model output.

use jsonschema::Draft;
use serde_json::Value;

/// Validate a JSON instance against a JSON Schema (Draft 2020-12).
///
/// Returns every violation as a stable message, or an empty list when the
/// instance conforms.
pub fn schema_violations(instance: &Value, schema_raw: &str) -> Result<Vec<String>, String> {
    let schema: Value =
        serde_json::from_str(schema_raw).map_err(|err| format!("parse schema json: {err}"))?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|err| format!("compile json schema: {err}"))?;
    Ok(compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect())
}
