//! Embedded message formats.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Format of the keys and values carried by a produce or consume call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum EmbeddedFormat {
    #[default]
    Binary,
    Json,
    String,
    Avro,
    Jsonschema,
    Protobuf,
}

impl EmbeddedFormat {
    pub const ALL: [EmbeddedFormat; 6] = [
        EmbeddedFormat::Binary,
        EmbeddedFormat::Json,
        EmbeddedFormat::String,
        EmbeddedFormat::Avro,
        EmbeddedFormat::Jsonschema,
        EmbeddedFormat::Protobuf,
    ];

    /// Whether payloads of this format are tagged with the schema envelope.
    pub fn requires_schema(&self) -> bool {
        matches!(
            self,
            EmbeddedFormat::Avro | EmbeddedFormat::Jsonschema | EmbeddedFormat::Protobuf
        )
    }

    /// Registry schema type for this format. Formats without a schema
    /// register as AVRO, the registry default.
    pub fn schema_type(&self) -> SchemaType {
        match self {
            EmbeddedFormat::Jsonschema => SchemaType::Json,
            EmbeddedFormat::Protobuf => SchemaType::Protobuf,
            _ => SchemaType::Avro,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddedFormat::Binary => "BINARY",
            EmbeddedFormat::Json => "JSON",
            EmbeddedFormat::String => "STRING",
            EmbeddedFormat::Avro => "AVRO",
            EmbeddedFormat::Jsonschema => "JSONSCHEMA",
            EmbeddedFormat::Protobuf => "PROTOBUF",
        }
    }

    /// Media-type segment used in `application/vnd.kafka.<segment>.v2+json`.
    pub fn media_type_segment(&self) -> &'static str {
        match self {
            EmbeddedFormat::Binary => "binary",
            EmbeddedFormat::Json => "json",
            EmbeddedFormat::String => "string",
            EmbeddedFormat::Avro => "avro",
            EmbeddedFormat::Jsonschema => "jsonschema",
            EmbeddedFormat::Protobuf => "protobuf",
        }
    }
}

impl fmt::Display for EmbeddedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmbeddedFormat {
    type Err = Error;

    /// Case-insensitive match on the format name.
    fn from_str(s: &str) -> Result<Self> {
        let canonical = s.trim().to_ascii_uppercase();
        EmbeddedFormat::ALL
            .into_iter()
            .find(|f| f.as_str() == canonical)
            .ok_or_else(|| Error::InvalidFormatType(s.to_string()))
    }
}

/// Schema type understood by the schema registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SchemaType {
    #[default]
    Avro,
    Protobuf,
    Json,
}

impl SchemaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaType::Avro => "AVRO",
            SchemaType::Protobuf => "PROTOBUF",
            SchemaType::Json => "JSON",
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_schema() {
        assert!(!EmbeddedFormat::Binary.requires_schema());
        assert!(!EmbeddedFormat::Json.requires_schema());
        assert!(!EmbeddedFormat::String.requires_schema());
        assert!(EmbeddedFormat::Avro.requires_schema());
        assert!(EmbeddedFormat::Jsonschema.requires_schema());
        assert!(EmbeddedFormat::Protobuf.requires_schema());
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(
            "avro".parse::<EmbeddedFormat>().unwrap(),
            EmbeddedFormat::Avro
        );
        assert_eq!(
            "JsonSchema".parse::<EmbeddedFormat>().unwrap(),
            EmbeddedFormat::Jsonschema
        );
        let err = "xml".parse::<EmbeddedFormat>().unwrap_err();
        assert_eq!(err.code(), 11051);
    }

    #[test]
    fn test_schema_type_mapping() {
        assert_eq!(EmbeddedFormat::Avro.schema_type(), SchemaType::Avro);
        assert_eq!(EmbeddedFormat::Jsonschema.schema_type(), SchemaType::Json);
        assert_eq!(EmbeddedFormat::Protobuf.schema_type(), SchemaType::Protobuf);
        assert_eq!(EmbeddedFormat::Binary.schema_type(), SchemaType::Avro);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&EmbeddedFormat::Jsonschema).unwrap();
        assert_eq!(json, "\"JSONSCHEMA\"");
        let schema_type: SchemaType = serde_json::from_str("\"PROTOBUF\"").unwrap();
        assert_eq!(schema_type, SchemaType::Protobuf);
    }
}
