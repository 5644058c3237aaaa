//! Per-format conversion of buffered records into caller-facing records.

use kafka_rest_codec::{deserialize_error, envelope, SchemaCodec};
use kafka_rest_schema_registry::SchemaManager;
use kafka_rest_types::{
    subject_name, ConsumerRecord, EmbeddedFormat, Error, RawRecord, RecordData, Result,
};
use serde_json::Value;

/// Chosen once per session from its embedded format.
#[derive(Clone)]
pub enum RecordConverter {
    Binary,
    Json,
    String,
    Schema {
        format: EmbeddedFormat,
        codec: SchemaCodec,
        schemas: SchemaManager,
    },
}

impl RecordConverter {
    pub fn new(format: EmbeddedFormat, codec: &SchemaCodec, schemas: &SchemaManager) -> Self {
        match format {
            EmbeddedFormat::Binary => RecordConverter::Binary,
            EmbeddedFormat::Json => RecordConverter::Json,
            EmbeddedFormat::String => RecordConverter::String,
            EmbeddedFormat::Avro | EmbeddedFormat::Jsonschema | EmbeddedFormat::Protobuf => {
                RecordConverter::Schema {
                    format,
                    codec: codec.clone(),
                    schemas: schemas.clone(),
                }
            }
        }
    }

    /// Convert `raw`, returning the record and its size for read budgets
    /// (raw key length plus raw value length).
    pub async fn convert(&self, raw: &RawRecord) -> Result<(ConsumerRecord, usize)> {
        let key = self.convert_part(raw, raw.key.as_deref(), true).await?;
        let value = self.convert_part(raw, raw.value.as_deref(), false).await?;
        let record = ConsumerRecord {
            topic: raw.topic.clone(),
            key,
            value,
            partition: raw.partition,
            offset: raw.offset,
        };
        Ok((record, raw.encoded_size()))
    }

    async fn convert_part(
        &self,
        raw: &RawRecord,
        bytes: Option<&[u8]>,
        is_key: bool,
    ) -> Result<Option<RecordData>> {
        let Some(bytes) = bytes else {
            return Ok(None);
        };

        let data = match self {
            RecordConverter::Binary => RecordData::Binary(bytes.to_vec()),
            RecordConverter::Json => RecordData::Json(
                serde_json::from_slice(bytes).map_err(|e| Error::JsonToObject(e.to_string()))?,
            ),
            RecordConverter::String => {
                RecordData::Json(Value::String(String::from_utf8_lossy(bytes).into_owned()))
            }
            RecordConverter::Schema {
                format,
                codec,
                schemas,
            } => {
                let (schema_id, payload) =
                    envelope::decode(bytes).map_err(|e| deserialize_error(*format, e))?;
                let subject = subject_name(&raw.topic, is_key);
                let raw_schema = schemas
                    .cache()
                    .get_raw_schema_by_id(&subject, schema_id)
                    .await?;
                RecordData::Json(codec.deserialize(*format, &raw_schema, payload)?)
            }
        };
        Ok(Some(data))
    }
}
