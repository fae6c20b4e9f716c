//! JSON Schema validation for extraction payloads.
//!
//! Payloads are validated against schema/extraction.schema.json, which is
//! embedded at compile time and compiled once.

use std::sync::OnceLock;

const PAYLOAD_SCHEMA_JSON: &str = include_str!("../../schema/extraction.schema.json");

/// Compiled once; a load failure is kept and reported on every payload.
static PAYLOAD_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

fn compile_payload_schema() -> Result<jsonschema::Validator, String> {
    let schema: serde_json::Value = serde_json::from_str(PAYLOAD_SCHEMA_JSON)
        .map_err(|e| format!("embedded payload schema is not JSON: {}", e))?;
    jsonschema::options()
        .build(&schema)
        .map_err(|e| format!("embedded payload schema does not compile: {}", e))
}

/// Validate a decoded payload against the schema.
///
/// Returns every violation, each suffixed with its instance path.
pub fn validate_payload_schema(payload: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = PAYLOAD_SCHEMA
        .get_or_init(compile_payload_schema)
        .as_ref()
        .map_err(|e| vec![e.clone()])?;

    let errors: Vec<String> = validator
        .iter_errors(payload)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
