//! Serialization for the formats that carry no schema: BINARY, JSON and STRING.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use kafka_rest_types::{EmbeddedFormat, Error};
use serde_json::Value;

/// Turn a request key or value into record bytes.
///
/// JSON `null` produces no bytes for every format.
pub fn serialize(format: EmbeddedFormat, data: &Value) -> Result<Option<Vec<u8>>, Error> {
    if data.is_null() {
        return Ok(None);
    }

    match format {
        EmbeddedFormat::Binary => {
            let text = data.as_str().ok_or_else(|| not_base64(data))?;
            BASE64
                .decode(text)
                .map(Some)
                .map_err(|_| not_base64(data))
        }
        EmbeddedFormat::String => {
            let text = data.as_str().ok_or_else(|| {
                Error::InvalidDataFormat(format!("data={data} is not a string."))
            })?;
            Ok(Some(text.as_bytes().to_vec()))
        }
        EmbeddedFormat::Json => serde_json::to_vec(data)
            .map(Some)
            .map_err(|e| Error::JsonToObject(e.to_string())),
        other => Err(Error::InvalidEmbeddedFormat(format!(
            "{other} requires a schema"
        ))),
    }
}

fn not_base64(data: &Value) -> Error {
    Error::InvalidDataFormat(format!("data={data} is not a base64 string."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_binary_decodes_base64() {
        assert_eq!(
            serialize(EmbeddedFormat::Binary, &json!("aGVsbG8=")).unwrap(),
            Some(b"hello".to_vec())
        );
    }

    #[test]
    fn test_binary_rejects_non_base64() {
        let err = serialize(EmbeddedFormat::Binary, &json!("not base64!")).unwrap_err();
        assert_eq!(err.code(), 11001);
        let err = serialize(EmbeddedFormat::Binary, &json!(12)).unwrap_err();
        assert_eq!(err.code(), 11001);
    }

    #[test]
    fn test_string_requires_text() {
        assert_eq!(
            serialize(EmbeddedFormat::String, &json!("héllo")).unwrap(),
            Some("héllo".as_bytes().to_vec())
        );
        let err = serialize(EmbeddedFormat::String, &json!({"a": 1})).unwrap_err();
        assert_eq!(err.code(), 11001);
    }

    #[test]
    fn test_json_serializes_tree() {
        assert_eq!(
            serialize(EmbeddedFormat::Json, &json!({"a": [1, 2]})).unwrap(),
            Some(br#"{"a":[1,2]}"#.to_vec())
        );
    }

    #[test]
    fn test_null_is_absent() {
        for format in [
            EmbeddedFormat::Binary,
            EmbeddedFormat::Json,
            EmbeddedFormat::String,
        ] {
            assert_eq!(serialize(format, &Value::Null).unwrap(), None);
        }
    }

    #[test]
    fn test_schema_formats_are_refused() {
        let err = serialize(EmbeddedFormat::Avro, &json!({"a": 1})).unwrap_err();
        assert_eq!(err.code(), 11052);
    }
}
