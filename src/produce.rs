//! Produce orchestration: resolve schemas, serialize, send, collect results.

use crate::dto::{PartitionOffset, ProduceRecordRequest, ProduceRequest, ProduceResponse};
use futures::future::join_all;
use kafka_rest_codec::{no_schema, SchemaCodec};
use kafka_rest_producer::{ProduceRecord, RecordProducer};
use kafka_rest_schema_registry::SchemaManager;
use kafka_rest_types::{EmbeddedFormat, Error, RegisteredSchema, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

pub struct ProduceAction {
    producer: Arc<dyn RecordProducer>,
    schemas: SchemaManager,
    codec: SchemaCodec,
}

impl ProduceAction {
    pub fn new(producer: Arc<dyn RecordProducer>, schemas: SchemaManager, codec: SchemaCodec) -> Self {
        Self {
            producer,
            schemas,
            codec,
        }
    }

    /// Produce every record of `request` to `topic`.
    ///
    /// Serialization and schema errors fail the whole call before anything is
    /// sent; broker errors are reported per record.
    pub async fn produce(
        &self,
        format: EmbeddedFormat,
        topic: &str,
        partition: Option<i32>,
        request: ProduceRequest,
    ) -> Result<ProduceResponse> {
        let (key_schema, value_schema) = if format.requires_schema() {
            let has_keys = request.records.iter().any(|r| carries(&r.key));
            let has_values = request.records.iter().any(|r| carries(&r.value));
            let key_schema = self
                .resolve_schema(
                    format,
                    topic,
                    request.key_schema_id,
                    request.key_schema.as_deref(),
                    true,
                    has_keys,
                )
                .await?;
            let value_schema = self
                .resolve_schema(
                    format,
                    topic,
                    request.value_schema_id,
                    request.value_schema.as_deref(),
                    false,
                    has_values,
                )
                .await?;
            (key_schema, value_schema)
        } else {
            (None, None)
        };

        let timestamp = now_millis();
        let records = request
            .records
            .iter()
            .map(|record| {
                self.serialize_record(
                    format,
                    topic,
                    partition,
                    key_schema.as_ref(),
                    value_schema.as_ref(),
                    record,
                )
                .map(|r| r.timestamp(timestamp))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!("Producing {} {} records to {}", records.len(), format, topic);
        let results = join_all(records.into_iter().map(|r| self.producer.produce(r))).await;
        let offsets = results
            .into_iter()
            .map(|result| match result {
                Ok(written) => PartitionOffset::written(written.partition, written.offset),
                Err(e) => {
                    warn!("Produce to {} failed: {e}", topic);
                    PartitionOffset::failed(&e)
                }
            })
            .collect();

        Ok(ProduceResponse {
            offsets,
            key_schema_id: key_schema.map(|s| s.schema_id),
            value_schema_id: value_schema.map(|s| s.schema_id),
        })
    }

    /// Explicit id, else inline schema, else the subject's latest schema when
    /// some record needs one.
    async fn resolve_schema(
        &self,
        format: EmbeddedFormat,
        topic: &str,
        schema_id: Option<i32>,
        raw_schema: Option<&str>,
        is_key: bool,
        needed: bool,
    ) -> Result<Option<RegisteredSchema>> {
        if schema_id.is_none() && raw_schema.is_none() {
            if !needed {
                return Ok(None);
            }
            return match self.schemas.get_schema(topic, format, None, None, is_key).await {
                Ok(schema) => Ok(Some(schema)),
                Err(e) if e.is_not_found() => Err(missing_schema(is_key)),
                Err(e) => Err(e),
            };
        }

        if schema_id.is_none() {
            if let Some(raw) = raw_schema {
                self.codec.validate_schema(format, raw)?;
            }
        }
        let schema = self
            .schemas
            .get_schema(topic, format, schema_id, raw_schema, is_key)
            .await?;
        Ok(Some(schema))
    }

    fn serialize_record(
        &self,
        format: EmbeddedFormat,
        topic: &str,
        partition: Option<i32>,
        key_schema: Option<&RegisteredSchema>,
        value_schema: Option<&RegisteredSchema>,
        record: &ProduceRecordRequest,
    ) -> Result<ProduceRecord> {
        let key = self.serialize(format, key_schema, record.key.as_ref(), true)?;
        let value = self.serialize(format, value_schema, record.value.as_ref(), false)?;
        Ok(ProduceRecord::new(topic)
            .partition(record.partition.or(partition))
            .key(key)
            .value(value))
    }

    fn serialize(
        &self,
        format: EmbeddedFormat,
        schema: Option<&RegisteredSchema>,
        data: Option<&Value>,
        is_key: bool,
    ) -> Result<Option<Vec<u8>>> {
        let data = data.unwrap_or(&Value::Null);
        if !format.requires_schema() {
            return no_schema::serialize(format, data);
        }
        if data.is_null() {
            return Ok(None);
        }
        let schema = schema.ok_or_else(|| missing_schema(is_key))?;
        self.codec.serialize(format, schema, data)
    }
}

fn carries(data: &Option<Value>) -> bool {
    data.as_ref().is_some_and(|v| !v.is_null())
}

fn missing_schema(is_key: bool) -> Error {
    if is_key {
        Error::KeySchemaMissing
    } else {
        Error::ValueSchemaMissing
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kafka_rest_producer::ProduceResult;
    use kafka_rest_schema_registry::{
        CacheConfig, CachedSchemaManager, RegistryConfig, SchemaRegistryClient,
    };
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingProducer {
        sent: Mutex<Vec<ProduceRecord>>,
    }

    #[async_trait]
    impl RecordProducer for RecordingProducer {
        async fn produce(&self, record: ProduceRecord) -> Result<ProduceResult> {
            let mut sent = self.sent.lock().unwrap();
            if record.topic == "forbidden" {
                return Err(Error::KafkaAuthorizationFailed(record.topic));
            }
            sent.push(record.clone());
            Ok(ProduceResult {
                partition: record.partition.unwrap_or(0),
                offset: sent.len() as i64 - 1,
            })
        }
    }

    fn action(producer: Arc<RecordingProducer>) -> ProduceAction {
        let client =
            SchemaRegistryClient::new(&RegistryConfig::new("http://127.0.0.1:9")).unwrap();
        let schemas = SchemaManager::new(Arc::new(CachedSchemaManager::new(
            client,
            &CacheConfig::default(),
        )));
        ProduceAction::new(producer, schemas, SchemaCodec::default())
    }

    fn request(records: Vec<ProduceRecordRequest>) -> ProduceRequest {
        ProduceRequest {
            records,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_binary_records_keep_order_and_partition_override() {
        let producer = Arc::new(RecordingProducer::default());
        let action = action(producer.clone());

        let response = action
            .produce(
                EmbeddedFormat::Binary,
                "orders",
                Some(3),
                request(vec![
                    ProduceRecordRequest {
                        partition: None,
                        key: Some(json!("a2V5")),
                        value: Some(json!("aGVsbG8=")),
                    },
                    ProduceRecordRequest {
                        partition: Some(1),
                        key: None,
                        value: Some(json!("d29ybGQ=")),
                    },
                ]),
            )
            .await
            .unwrap();

        assert_eq!(
            response.offsets,
            vec![PartitionOffset::written(3, 0), PartitionOffset::written(1, 1)]
        );
        assert_eq!(response.key_schema_id, None);

        let sent = producer.sent.lock().unwrap();
        assert_eq!(sent[0].key.as_deref(), Some(&b"key"[..]));
        assert_eq!(sent[0].value.as_deref(), Some(&b"hello"[..]));
        assert_eq!(sent[1].key, None);
        assert!(sent.iter().all(|r| r.timestamp.is_some()));
    }

    #[tokio::test]
    async fn test_invalid_binary_fails_before_sending() {
        let producer = Arc::new(RecordingProducer::default());
        let action = action(producer.clone());

        let err = action
            .produce(
                EmbeddedFormat::Binary,
                "orders",
                None,
                request(vec![
                    ProduceRecordRequest {
                        value: Some(json!("aGVsbG8=")),
                        ..Default::default()
                    },
                    ProduceRecordRequest {
                        value: Some(json!(17)),
                        ..Default::default()
                    },
                ]),
            )
            .await
            .unwrap_err();

        assert_eq!(err.code(), 11001);
        assert!(producer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_broker_errors_are_reported_per_record() {
        let producer = Arc::new(RecordingProducer::default());
        let action = action(producer);

        let response = action
            .produce(
                EmbeddedFormat::Json,
                "forbidden",
                None,
                request(vec![ProduceRecordRequest {
                    value: Some(json!({"id": 1})),
                    ..Default::default()
                }]),
            )
            .await
            .unwrap();

        assert_eq!(response.offsets.len(), 1);
        assert_eq!(response.offsets[0].error_code, Some(40301));
        assert_eq!(response.offsets[0].partition, None);
    }

    #[tokio::test]
    async fn test_schema_format_without_data_needs_no_registry() {
        let producer = Arc::new(RecordingProducer::default());
        let action = action(producer.clone());

        // registry is unreachable; null keys and values never consult it
        let response = action
            .produce(
                EmbeddedFormat::Avro,
                "orders",
                None,
                request(vec![ProduceRecordRequest::default()]),
            )
            .await
            .unwrap();
        assert_eq!(response.offsets, vec![PartitionOffset::written(0, 0)]);
        assert_eq!(response.value_schema_id, None);
        assert_eq!(producer.sent.lock().unwrap()[0].value, None);
    }

    #[tokio::test]
    async fn test_invalid_inline_schema_is_rejected_before_registry() {
        let producer = Arc::new(RecordingProducer::default());
        let action = action(producer);

        let err = action
            .produce(
                EmbeddedFormat::Avro,
                "orders",
                None,
                ProduceRequest {
                    records: vec![ProduceRecordRequest {
                        value: Some(json!({"id": 1})),
                        ..Default::default()
                    }],
                    value_schema: Some("{not a schema".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), 4001);
    }
}
