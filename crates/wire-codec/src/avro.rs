//! Avro datums ↔ JSON trees.
//!
//! JSON follows the Avro JSON encoding: `bytes` and `fixed` values are
//! strings whose characters are code points 0-255, one per byte.

use crate::{CodecError, Result};
use apache_avro::schema::{Name, Namespace, ResolvedSchema};
use apache_avro::types::Value as AvroValue;
use apache_avro::Schema;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;

pub fn parse_schema(raw: &str) -> Result<Schema> {
    Schema::parse_str(raw).map_err(|e| CodecError::Schema(e.to_string()))
}

/// Resolve a JSON tree against `schema` and write it as an Avro binary datum.
///
/// Numbers are range-checked against the field type before resolution, so an
/// `int` field never receives a wrapped 64-bit value. Resolution then fills
/// record defaults, so callers can pass plain JSON (`{"f": 1}` rather than a
/// tagged union).
pub fn encode(schema: &Schema, value: &JsonValue) -> Result<Vec<u8>> {
    let resolved = ResolvedSchema::try_from(schema).map_err(|e| CodecError::Schema(e.to_string()))?;
    let lowered = Lowering {
        names: resolved.get_names(),
    }
    .lower(schema, value, &None)?;
    let avro = lowered
        .resolve(schema)
        .map_err(|e| CodecError::Avro(e.to_string()))?;
    apache_avro::to_avro_datum(schema, avro).map_err(|e| CodecError::Avro(e.to_string()))
}

/// Read an Avro binary datum back as a JSON tree.
///
/// Union values render as their bare branch value.
pub fn decode(schema: &Schema, data: &[u8]) -> Result<JsonValue> {
    let avro = apache_avro::from_avro_datum(schema, &mut &data[..], None)
        .map_err(|e| CodecError::Avro(e.to_string()))?;
    to_json(avro)
}

struct Lowering<'a> {
    names: &'a HashMap<Name, &'a Schema>,
}

impl Lowering<'_> {
    /// Turn JSON into the Avro value `schema` expects, rejecting values the
    /// field type cannot hold.
    fn lower(&self, schema: &Schema, json: &JsonValue, ns: &Namespace) -> Result<AvroValue> {
        match schema {
            Schema::Null => match json {
                JsonValue::Null => Ok(AvroValue::Null),
                other => Err(mismatch("null", other)),
            },
            Schema::Boolean => json
                .as_bool()
                .map(AvroValue::Boolean)
                .ok_or_else(|| mismatch("boolean", json)),
            Schema::Int | Schema::Date | Schema::TimeMillis => {
                let n = json.as_i64().ok_or_else(|| mismatch("int", json))?;
                i32::try_from(n)
                    .map(AvroValue::Int)
                    .map_err(|_| CodecError::Avro(format!("{n} is out of range for int")))
            }
            Schema::Long
            | Schema::TimeMicros
            | Schema::TimestampMillis
            | Schema::TimestampMicros
            | Schema::TimestampNanos
            | Schema::LocalTimestampMillis
            | Schema::LocalTimestampMicros
            | Schema::LocalTimestampNanos => json
                .as_i64()
                .map(AvroValue::Long)
                .ok_or_else(|| mismatch("long", json)),
            Schema::Float => {
                let x = json.as_f64().ok_or_else(|| mismatch("float", json))?;
                if x.abs() > f64::from(f32::MAX) {
                    return Err(CodecError::Avro(format!("{x} is out of range for float")));
                }
                Ok(AvroValue::Float(x as f32))
            }
            Schema::Double => json
                .as_f64()
                .map(AvroValue::Double)
                .ok_or_else(|| mismatch("double", json)),
            Schema::Bytes => match json {
                JsonValue::String(s) => latin1_bytes(s).map(AvroValue::Bytes),
                other => Ok(AvroValue::from(other.clone())),
            },
            Schema::Fixed(fixed) => {
                let s = json.as_str().ok_or_else(|| mismatch("fixed", json))?;
                let bytes = latin1_bytes(s)?;
                if bytes.len() != fixed.size {
                    return Err(CodecError::Avro(format!(
                        "fixed {} expects {} bytes, got {}",
                        fixed.name,
                        fixed.size,
                        bytes.len()
                    )));
                }
                Ok(AvroValue::Fixed(fixed.size, bytes))
            }
            Schema::Array(array) => match json {
                JsonValue::Array(items) => items
                    .iter()
                    .map(|item| self.lower(&array.items, item, ns))
                    .collect::<Result<Vec<_>>>()
                    .map(AvroValue::Array),
                other => Err(mismatch("array", other)),
            },
            Schema::Map(map) => match json {
                JsonValue::Object(entries) => entries
                    .iter()
                    .map(|(key, value)| Ok((key.clone(), self.lower(&map.types, value, ns)?)))
                    .collect::<Result<HashMap<_, _>>>()
                    .map(AvroValue::Map),
                other => Err(mismatch("map", other)),
            },
            Schema::Record(record) => {
                let JsonValue::Object(entries) = json else {
                    return Err(mismatch(&record.name.to_string(), json));
                };
                let inner = record.name.namespace.clone().or_else(|| ns.clone());
                // absent fields stay absent so resolution can apply defaults
                let mut fields = HashMap::new();
                for field in &record.fields {
                    if let Some(value) = entries.get(&field.name) {
                        let lowered = self.lower(&field.schema, value, &inner).map_err(|e| {
                            CodecError::Avro(format!("field {}: {}", field.name, strip(e)))
                        })?;
                        fields.insert(field.name.clone(), lowered);
                    }
                }
                Ok(AvroValue::Map(fields))
            }
            Schema::Union(union) => {
                let mut last = None;
                for (index, variant) in union.variants().iter().enumerate() {
                    match self.lower(variant, json, ns) {
                        Ok(value) => return Ok(AvroValue::Union(index as u32, Box::new(value))),
                        Err(e) => last = Some(e),
                    }
                }
                Err(last.unwrap_or_else(|| mismatch("union", json)))
            }
            Schema::Ref { name } => {
                let target = self
                    .names
                    .get(&name.fully_qualified_name(ns))
                    .ok_or_else(|| CodecError::Schema(format!("unknown type {name}")))?;
                self.lower(target, json, ns)
            }
            Schema::String | Schema::Enum(_) | Schema::Uuid => json
                .as_str()
                .map(|s| AvroValue::String(s.to_string()))
                .ok_or_else(|| mismatch("string", json)),
            // decimal and duration resolve from the plain value
            _ => Ok(AvroValue::from(json.clone())),
        }
    }
}

fn mismatch(expected: &str, value: &JsonValue) -> CodecError {
    CodecError::Avro(format!("expected {expected}, got {value}"))
}

fn strip(e: CodecError) -> String {
    match e {
        CodecError::Avro(message) => message,
        other => other.to_string(),
    }
}

fn latin1_bytes(s: &str) -> Result<Vec<u8>> {
    s.chars()
        .map(|c| {
            u8::try_from(u32::from(c))
                .map_err(|_| CodecError::Avro(format!("character {c:?} does not fit in a byte")))
        })
        .collect()
}

fn latin1_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn to_json(value: AvroValue) -> Result<JsonValue> {
    match value {
        AvroValue::Bytes(bytes) | AvroValue::Fixed(_, bytes) => {
            Ok(JsonValue::String(latin1_string(&bytes)))
        }
        AvroValue::Union(_, inner) => to_json(*inner),
        AvroValue::Array(items) => items
            .into_iter()
            .map(to_json)
            .collect::<Result<Vec<_>>>()
            .map(JsonValue::Array),
        AvroValue::Map(entries) => entries
            .into_iter()
            .map(|(key, value)| Ok((key, to_json(value)?)))
            .collect::<Result<Map<_, _>>>()
            .map(JsonValue::Object),
        AvroValue::Record(fields) => fields
            .into_iter()
            .map(|(key, value)| Ok((key, to_json(value)?)))
            .collect::<Result<Map<_, _>>>()
            .map(JsonValue::Object),
        other => JsonValue::try_from(other).map_err(|e| CodecError::Avro(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const USER_SCHEMA: &str = r#"{
        "type": "record",
        "name": "User",
        "fields": [
            {"name": "id", "type": "long"},
            {"name": "name", "type": "string"},
            {"name": "email", "type": ["null", "string"], "default": null},
            {"name": "score", "type": "double", "default": 0.0}
        ]
    }"#;

    #[test]
    fn test_record_round_trip() {
        let schema = parse_schema(USER_SCHEMA).unwrap();
        let input = json!({"id": 42, "name": "ada", "email": "ada@example.com", "score": 9.5});

        let bytes = encode(&schema, &input).unwrap();
        assert_eq!(decode(&schema, &bytes).unwrap(), input);
    }

    #[test]
    fn test_missing_field_uses_default() {
        let schema = parse_schema(USER_SCHEMA).unwrap();
        let bytes = encode(&schema, &json!({"id": 1, "name": "bob"})).unwrap();
        assert_eq!(
            decode(&schema, &bytes).unwrap(),
            json!({"id": 1, "name": "bob", "email": null, "score": 0.0})
        );
    }

    #[test]
    fn test_type_mismatch_is_rejected() {
        let schema = parse_schema(USER_SCHEMA).unwrap();
        assert!(encode(&schema, &json!({"id": "x", "name": "bob"})).is_err());
    }

    #[test]
    fn test_out_of_range_numbers_are_rejected() {
        let schema = parse_schema(
            r#"{"type": "record", "name": "N", "fields": [
                {"name": "n", "type": "int"},
                {"name": "f", "type": "float", "default": 0.0}
            ]}"#,
        )
        .unwrap();

        let err = encode(&schema, &json!({"n": 3_000_000_000_i64})).unwrap_err();
        assert!(matches!(err, CodecError::Avro(_)), "{err}");
        assert!(encode(&schema, &json!({"n": -2_147_483_649_i64})).is_err());
        assert!(encode(&schema, &json!({"n": 1, "f": 1e300})).is_err());

        let bytes = encode(&schema, &json!({"n": i32::MAX, "f": 1.5})).unwrap();
        assert_eq!(
            decode(&schema, &bytes).unwrap(),
            json!({"n": i32::MAX, "f": 1.5})
        );
    }

    #[test]
    fn test_union_picks_branch_that_holds_the_value() {
        let schema = parse_schema(r#"["null", "int", "long"]"#).unwrap();
        let bytes = encode(&schema, &json!(3_000_000_000_i64)).unwrap();
        assert_eq!(decode(&schema, &bytes).unwrap(), json!(3_000_000_000_i64));

        let narrow = parse_schema(r#"["null", "int"]"#).unwrap();
        assert!(encode(&narrow, &json!(3_000_000_000_i64)).is_err());

        let mixed = parse_schema(r#"["string", "int"]"#).unwrap();
        let bytes = encode(&mixed, &json!(5)).unwrap();
        assert_eq!(decode(&mixed, &bytes).unwrap(), json!(5));
    }

    #[test]
    fn test_bytes_and_fixed_round_trip_as_strings() {
        let schema = parse_schema(
            r#"{"type": "record", "name": "Blob", "fields": [
                {"name": "b", "type": "bytes"},
                {"name": "h", "type": {"type": "fixed", "name": "Hash", "size": 2}}
            ]}"#,
        )
        .unwrap();
        let input = json!({"b": "abc\u{00ff}", "h": "\u{0001}z"});

        let bytes = encode(&schema, &input).unwrap();
        assert_eq!(decode(&schema, &bytes).unwrap(), input);

        assert!(encode(&schema, &json!({"b": "\u{0100}", "h": "zz"})).is_err());
        assert!(encode(&schema, &json!({"b": "", "h": "zzz"})).is_err());
    }

    #[test]
    fn test_named_type_reference() {
        let schema = parse_schema(
            r#"{"type": "record", "name": "Pair", "namespace": "shop", "fields": [
                {"name": "a", "type": {"type": "record", "name": "Item", "fields": [
                    {"name": "qty", "type": "int"}
                ]}},
                {"name": "b", "type": "Item"}
            ]}"#,
        )
        .unwrap();
        let input = json!({"a": {"qty": 1}, "b": {"qty": 2}});
        let bytes = encode(&schema, &input).unwrap();
        assert_eq!(decode(&schema, &bytes).unwrap(), input);

        assert!(encode(&schema, &json!({"a": {"qty": 1}, "b": {"qty": 1e10}})).is_err());
    }

    #[test]
    fn test_primitive_schema() {
        let schema = parse_schema(r#""string""#).unwrap();
        let bytes = encode(&schema, &json!("key-1")).unwrap();
        assert_eq!(decode(&schema, &bytes).unwrap(), json!("key-1"));
    }

    #[test]
    fn test_invalid_schema() {
        assert!(matches!(
            parse_schema(r#"{"type": "record"}"#),
            Err(CodecError::Schema(_))
        ));
    }

    #[test]
    fn test_truncated_datum() {
        let schema = parse_schema(USER_SCHEMA).unwrap();
        let bytes = encode(&schema, &json!({"id": 42, "name": "ada"})).unwrap();
        assert!(decode(&schema, &bytes[..2]).is_err());
    }
}
