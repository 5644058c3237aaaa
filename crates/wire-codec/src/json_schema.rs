//! JSON Schema validated JSON payloads.

use crate::{CodecError, Result};
use jsonschema::Validator;
use serde_json::Value;

pub fn parse_schema(raw: &str) -> Result<Validator> {
    let schema: Value =
        serde_json::from_str(raw).map_err(|e| CodecError::Schema(format!("Invalid JSON: {e}")))?;
    jsonschema::validator_for(&schema).map_err(|e| CodecError::Schema(e.to_string()))
}

/// Validate `value` and write it as raw JSON bytes.
pub fn encode(validator: &Validator, value: &Value) -> Result<Vec<u8>> {
    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();
    if !errors.is_empty() {
        return Err(CodecError::JsonSchema(errors.join("; ")));
    }
    serde_json::to_vec(value).map_err(|e| CodecError::JsonSchema(e.to_string()))
}

pub fn decode(data: &[u8]) -> Result<Value> {
    serde_json::from_slice(data).map_err(|e| CodecError::JsonSchema(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ORDER_SCHEMA: &str = r#"{
        "type": "object",
        "properties": {
            "id": {"type": "integer"},
            "sku": {"type": "string"}
        },
        "required": ["id"]
    }"#;

    #[test]
    fn test_valid_round_trip() {
        let validator = parse_schema(ORDER_SCHEMA).unwrap();
        let input = json!({"id": 7, "sku": "a-1"});
        let bytes = encode(&validator, &input).unwrap();
        assert_eq!(decode(&bytes).unwrap(), input);
    }

    #[test]
    fn test_validation_failure_lists_errors() {
        let validator = parse_schema(ORDER_SCHEMA).unwrap();
        let err = encode(&validator, &json!({"sku": 5})).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("id"));
    }

    #[test]
    fn test_schema_must_be_json() {
        assert!(matches!(parse_schema("not json"), Err(CodecError::Schema(_))));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode(b"{\"id\":").is_err());
    }
}
