//! Request and response bodies of the REST API.

use kafka_rest_consumer::ConsumerInstanceConfig;
use kafka_rest_types::{EmbeddedFormat, Error, Result, TopicPartition, TopicPartitionOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateConsumerRequest {
    pub id: Option<String>,
    pub name: Option<String>,
    pub format: Option<String>,
    #[serde(rename = "auto.offset.reset")]
    pub auto_offset_reset: Option<String>,
    #[serde(rename = "enable.auto.commit")]
    pub enable_auto_commit: Option<String>,
    #[serde(rename = "fetch.min.bytes")]
    pub fetch_min_bytes: Option<i32>,
    #[serde(rename = "request.timeout.ms")]
    pub request_timeout_ms: Option<i32>,
}

impl CreateConsumerRequest {
    /// A missing format means BINARY; an unknown one is rejected.
    pub fn into_instance_config(self) -> Result<ConsumerInstanceConfig> {
        let format = match self.format.as_deref() {
            None => EmbeddedFormat::Binary,
            Some(name) => name.parse()?,
        };
        Ok(ConsumerInstanceConfig {
            id: self.id,
            name: self.name,
            format,
            auto_offset_reset: self.auto_offset_reset,
            enable_auto_commit: self.enable_auto_commit,
            fetch_min_bytes: self.fetch_min_bytes,
            request_timeout_ms: self.request_timeout_ms,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateConsumerResponse {
    pub instance_id: String,
    pub base_uri: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionRequest {
    pub topics: Option<Vec<String>>,
    pub topic_pattern: Option<String>,
}

impl SubscriptionRequest {
    pub fn validate(&self) -> Result<()> {
        let has_topics = self.topics.as_ref().is_some_and(|t| !t.is_empty());
        let has_pattern = self.topic_pattern.as_ref().is_some_and(|p| !p.is_empty());
        if has_topics == has_pattern {
            return Err(Error::InvalidDataFormat(
                "exactly one of topics or topic_pattern is required".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionResponse {
    pub topics: Vec<String>,
}

/// Body of assign, seek-to-beginning/end and committed-offset calls, and of
/// the assignment response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionsBody {
    pub partitions: Vec<TopicPartition>,
}

/// Body of commit and seek calls, and of the committed-offsets response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetsBody {
    pub offsets: Vec<TopicPartitionOffset>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProduceRequest {
    pub records: Vec<ProduceRecordRequest>,
    pub key_schema_id: Option<i32>,
    pub key_schema: Option<String>,
    pub value_schema_id: Option<i32>,
    pub value_schema: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProduceRecordRequest {
    pub partition: Option<i32>,
    pub key: Option<Value>,
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProduceResponse {
    pub offsets: Vec<PartitionOffset>,
    pub key_schema_id: Option<i32>,
    pub value_schema_id: Option<i32>,
}

/// Outcome of one produced record: a position, or an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionOffset {
    pub partition: Option<i32>,
    pub offset: Option<i64>,
    pub error_code: Option<i32>,
    pub error: Option<String>,
}

impl PartitionOffset {
    pub fn written(partition: i32, offset: i64) -> Self {
        Self {
            partition: Some(partition),
            offset: Some(offset),
            error_code: None,
            error: None,
        }
    }

    pub fn failed(error: &Error) -> Self {
        Self {
            partition: None,
            offset: None,
            error_code: Some(error.code()),
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error_code: i32,
    pub message: String,
}

impl From<&Error> for ErrorBody {
    fn from(error: &Error) -> Self {
        Self {
            error_code: error.code(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_request_uses_dotted_names() {
        let request: CreateConsumerRequest = serde_json::from_value(json!({
            "name": "c1",
            "format": "avro",
            "auto.offset.reset": "latest",
            "enable.auto.commit": "true",
            "fetch.min.bytes": 1024,
            "request.timeout.ms": 5000
        }))
        .unwrap();
        let config = request.into_instance_config().unwrap();
        assert_eq!(config.name.as_deref(), Some("c1"));
        assert_eq!(config.format, EmbeddedFormat::Avro);
        assert_eq!(config.auto_offset_reset.as_deref(), Some("latest"));
        assert_eq!(config.enable_auto_commit.as_deref(), Some("true"));
        assert_eq!(config.fetch_min_bytes, Some(1024));
        assert_eq!(config.request_timeout_ms, Some(5000));
    }

    #[test]
    fn test_create_request_format() {
        let config = CreateConsumerRequest::default()
            .into_instance_config()
            .unwrap();
        assert_eq!(config.format, EmbeddedFormat::Binary);

        let err = CreateConsumerRequest {
            format: Some("xml".to_string()),
            ..Default::default()
        }
        .into_instance_config()
        .unwrap_err();
        assert_eq!(err.code(), 11051);
    }

    #[test]
    fn test_subscription_validation() {
        let topics = SubscriptionRequest {
            topics: Some(vec!["a".to_string()]),
            topic_pattern: None,
        };
        assert!(topics.validate().is_ok());

        let pattern = SubscriptionRequest {
            topics: None,
            topic_pattern: Some("orders-.*".to_string()),
        };
        assert!(pattern.validate().is_ok());

        assert!(SubscriptionRequest::default().validate().is_err());
        let both = SubscriptionRequest {
            topics: Some(vec!["a".to_string()]),
            topic_pattern: Some("b".to_string()),
        };
        assert!(both.validate().is_err());
    }

    #[test]
    fn test_partition_offset_rendering() {
        let ok = serde_json::to_value(PartitionOffset::written(1, 42)).unwrap();
        assert_eq!(
            ok,
            json!({"partition": 1, "offset": 42, "error_code": null, "error": null})
        );

        let failed = PartitionOffset::failed(&Error::PartitionNotFound("orders-9".to_string()));
        assert_eq!(failed.error_code, Some(40401));
        assert_eq!(
            failed.error.as_deref(),
            Some("Partition not found: orders-9")
        );
    }
}
