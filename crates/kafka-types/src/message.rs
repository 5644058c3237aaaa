//! Kafka record types.
//!
//! [`RawRecord`] is what a consumer session buffers after polling the broker;
//! [`ConsumerRecord`] is what a read returns to the HTTP caller once the
//! session's format-specific converter has run.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Serialize, Serializer};

/// A record pulled from the broker but not yet returned to a caller.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Kafka topic name
    pub topic: String,
    /// Kafka partition number
    pub partition: i32,
    /// Kafka offset within the partition
    pub offset: i64,
    /// Message key bytes (if any)
    pub key: Option<Vec<u8>>,
    /// Message value bytes (if any)
    pub value: Option<Vec<u8>>,
    /// Message timestamp in milliseconds since epoch (if available)
    pub timestamp: Option<i64>,
}

impl RawRecord {
    /// Encoded key length plus encoded value length.
    ///
    /// Read budgets are accounted on this number for every format.
    pub fn encoded_size(&self) -> usize {
        self.key.as_ref().map_or(0, Vec::len) + self.value.as_ref().map_or(0, Vec::len)
    }
}

/// A converted key or value.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordData {
    /// Raw bytes, rendered as base64 text on the wire
    Binary(Vec<u8>),
    /// Generic JSON tree
    Json(serde_json::Value),
}

impl Serialize for RecordData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RecordData::Binary(bytes) => serializer.serialize_str(&BASE64.encode(bytes)),
            RecordData::Json(value) => value.serialize(serializer),
        }
    }
}

/// A record handed back by a read call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsumerRecord {
    pub topic: String,
    pub key: Option<RecordData>,
    pub value: Option<RecordData>,
    pub partition: i32,
    pub offset: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encoded_size_counts_missing_parts_as_zero() {
        let record = RawRecord {
            topic: "orders".to_string(),
            partition: 0,
            offset: 1,
            key: None,
            value: Some(vec![1, 2, 3]),
            timestamp: None,
        };
        assert_eq!(record.encoded_size(), 3);
    }

    #[test]
    fn test_binary_record_serializes_as_base64() {
        let record = ConsumerRecord {
            topic: "orders".to_string(),
            key: None,
            value: Some(RecordData::Binary(b"hello".to_vec())),
            partition: 2,
            offset: 42,
        };
        let rendered = serde_json::to_value(&record).unwrap();
        assert_eq!(
            rendered,
            json!({
                "topic": "orders",
                "key": null,
                "value": "aGVsbG8=",
                "partition": 2,
                "offset": 42
            })
        );
    }

    #[test]
    fn test_json_record_serializes_tree() {
        let data = RecordData::Json(json!({"id": 1}));
        assert_eq!(serde_json::to_value(&data).unwrap(), json!({"id": 1}));
    }
}
