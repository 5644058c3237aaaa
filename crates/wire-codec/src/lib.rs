//! Record codecs for kafka-rest-proxy.
//!
//! Schema-tagged formats (AVRO, JSONSCHEMA, PROTOBUF) travel inside the
//! registry wire envelope ([`envelope`]); the payload codec is picked by the
//! embedded format. Schemaless formats are handled by [`no_schema`].
//!
//! [`SchemaCodec`] keeps parsed schemas keyed by `(format, raw schema text)`
//! so a schema is parsed once rather than once per record.

pub mod avro;
pub mod envelope;
pub mod json_schema;
pub mod no_schema;
pub mod proto;

use kafka_rest_types::{EmbeddedFormat, Error, RegisteredSchema};
use moka::sync::Cache;
use proto::{ProtoDecoder, ProtoEncoder, ProtoError, ProtoSchema};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error as ThisError;
use tracing::debug;

#[derive(ThisError, Debug)]
pub enum CodecError {
    #[error("Invalid wire envelope: {0}")]
    Envelope(String),

    #[error("Invalid schema: {0}")]
    Schema(String),

    #[error("Avro error: {0}")]
    Avro(String),

    #[error("JSON Schema error: {0}")]
    JsonSchema(String),

    #[error(transparent)]
    Proto(#[from] ProtoError),
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// A schema parsed into the form its payload codec needs.
pub enum ParsedSchema {
    Avro(apache_avro::Schema),
    JsonSchema(jsonschema::Validator),
    Protobuf(ProtoSchema),
}

impl ParsedSchema {
    pub fn parse(format: EmbeddedFormat, raw: &str) -> Result<Self> {
        match format {
            EmbeddedFormat::Avro => avro::parse_schema(raw).map(ParsedSchema::Avro),
            EmbeddedFormat::Jsonschema => {
                json_schema::parse_schema(raw).map(ParsedSchema::JsonSchema)
            }
            EmbeddedFormat::Protobuf => ProtoSchema::from_string(raw)
                .map(ParsedSchema::Protobuf)
                .map_err(|e| CodecError::Schema(e.to_string())),
            other => Err(CodecError::Schema(format!("{other} has no schema"))),
        }
    }

    pub fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        match self {
            ParsedSchema::Avro(schema) => avro::encode(schema, value),
            ParsedSchema::JsonSchema(validator) => json_schema::encode(validator, value),
            ParsedSchema::Protobuf(schema) => Ok(ProtoEncoder::new(schema).encode(value)?),
        }
    }

    pub fn decode(&self, payload: &[u8]) -> Result<Value> {
        match self {
            ParsedSchema::Avro(schema) => avro::decode(schema, payload),
            ParsedSchema::JsonSchema(_) => json_schema::decode(payload),
            ParsedSchema::Protobuf(schema) => Ok(ProtoDecoder::new(schema).decode(payload)?),
        }
    }
}

/// Error reported when a record of `format` cannot be turned back into JSON.
pub fn deserialize_error(format: EmbeddedFormat, detail: impl std::fmt::Display) -> Error {
    let detail = detail.to_string();
    match format {
        EmbeddedFormat::Avro => Error::AvroToJson(detail),
        EmbeddedFormat::Jsonschema => Error::JsonSchemaToJson(detail),
        EmbeddedFormat::Protobuf => Error::ProtobufToJson(detail),
        _ => Error::JsonToObject(detail),
    }
}

/// Serializes and deserializes schema-tagged records.
#[derive(Clone)]
pub struct SchemaCodec {
    parsed: Cache<(EmbeddedFormat, String), Arc<ParsedSchema>>,
}

impl SchemaCodec {
    pub fn new(max_entries: u64) -> Self {
        Self {
            parsed: Cache::builder().max_capacity(max_entries).build(),
        }
    }

    fn parsed(&self, format: EmbeddedFormat, raw: &str) -> Result<Arc<ParsedSchema>> {
        let key = (format, raw.to_string());
        if let Some(schema) = self.parsed.get(&key) {
            return Ok(schema);
        }
        debug!("Parsing {} schema ({} bytes)", format, raw.len());
        let schema = Arc::new(ParsedSchema::parse(format, raw)?);
        self.parsed.insert(key, schema.clone());
        Ok(schema)
    }

    /// Check that `raw` parses as a schema of `format`.
    pub fn validate_schema(&self, format: EmbeddedFormat, raw: &str) -> std::result::Result<(), Error> {
        self.parsed(format, raw)
            .map(|_| ())
            .map_err(|e| Error::InvalidSchema(e.to_string()))
    }

    /// Encode `value` with `schema` and wrap it in the wire envelope.
    ///
    /// JSON `null` produces no bytes.
    pub fn serialize(
        &self,
        format: EmbeddedFormat,
        schema: &RegisteredSchema,
        value: &Value,
    ) -> std::result::Result<Option<Vec<u8>>, Error> {
        if value.is_null() {
            return Ok(None);
        }
        let parsed = self
            .parsed(format, &schema.schema)
            .map_err(|e| Error::InvalidSchema(e.to_string()))?;
        let payload = parsed
            .encode(value)
            .map_err(|e| Error::JsonToObject(e.to_string()))?;
        Ok(Some(envelope::encode(schema.schema_id, &payload)))
    }

    /// Decode an envelope payload (header already stripped) written with `raw_schema`.
    pub fn deserialize(
        &self,
        format: EmbeddedFormat,
        raw_schema: &str,
        payload: &[u8],
    ) -> std::result::Result<Value, Error> {
        let parsed = self
            .parsed(format, raw_schema)
            .map_err(|e| deserialize_error(format, e))?;
        parsed
            .decode(payload)
            .map_err(|e| deserialize_error(format, e))
    }
}

impl Default for SchemaCodec {
    fn default() -> Self {
        Self::new(10_000)
    }
}
