//! Gateway error taxonomy.
//!
//! Every error kind maps to a stable `(status, code, message)` triple. The
//! variant payload is an optional detail string that may name the offending
//! subject, schema id or topic; it never carries internal state.

use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid data format: {0}")]
    InvalidDataFormat(String),

    #[error("Invalid format type: {0}")]
    InvalidFormatType(String),

    #[error("Invalid embedded format: {0}")]
    InvalidEmbeddedFormat(String),

    #[error("Request includes keys but does not include key schema")]
    KeySchemaMissing,

    #[error("Request includes values but does not include value schema")]
    ValueSchemaMissing,

    #[error("Kafka authentication failed: {0}")]
    KafkaAuthenticationFailed(String),

    #[error("Kafka authorization failed: {0}")]
    KafkaAuthorizationFailed(String),

    #[error("Partition not found: {0}")]
    PartitionNotFound(String),

    #[error("Consumer instance not found: group={group}, instance={instance}")]
    ConsumerNotFound { group: String, instance: String },

    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    #[error("Subject not found: {0}")]
    SubjectNotFound(String),

    #[error("Schema version not found: {0}")]
    SchemaVersionNotFound(String),

    #[error(
        "The requested embedded data format does not match the deserializer for this consumer instance: requested={requested}, configured={configured}"
    )]
    FormatMismatch {
        requested: String,
        configured: String,
    },

    #[error("Consumer with specified consumer ID already exists in the specified consumer group: group={group}, instance={instance}")]
    ConsumerAlreadyExists { group: String, instance: String },

    #[error("Kafka retriable failed: {0}")]
    KafkaRetriable(String),

    #[error("Kafka error: {0}")]
    Kafka(String),

    #[error("Unexpected non-Kafka exception returned by Kafka: {0}")]
    UnexpectedNonKafka(String),

    #[error("No consumer pool resources: capacity {0} reached")]
    PoolFull(usize),

    #[error("Consumer commit offsets failed: {0}")]
    CommitFailed(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid schema version: {0}")]
    InvalidSchemaVersion(String),

    #[error("Invalid compatibility level: {0}")]
    InvalidCompatibility(String),

    #[error("Request subject is in read-only mode: {0}")]
    ModeConflict(String),

    #[error("Unprocessable schema: {0}")]
    UnprocessableSchema(String),

    #[error("Schema Registry error in the backend data store: {0}")]
    RegistryBackend(String),

    #[error("Schema Registry error while forwarding the request to the master: {0}")]
    RegistryForwarding(String),

    #[error("Schema Registry operation timed out: {0}")]
    RegistryTimedOut(String),

    #[error("Schema Registry internal server error: {0}")]
    RegistryInternal(String),

    #[error("Failed to convert JSON to Object: {0}")]
    JsonToObject(String),

    #[error("Failed to convert Avro to JSON: {0}")]
    AvroToJson(String),

    #[error("Failed to convert JSON Schema to JSON: {0}")]
    JsonSchemaToJson(String),

    #[error("Failed to convert Protobuf to JSON: {0}")]
    ProtobufToJson(String),
}

impl Error {
    /// Numeric error code reported to HTTP callers and in produce results.
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidDataFormat(_) => 11001,
            Error::InvalidFormatType(_) => 11051,
            Error::InvalidEmbeddedFormat(_) => 11052,
            Error::KeySchemaMissing => 11101,
            Error::ValueSchemaMissing => 11102,
            Error::KafkaAuthenticationFailed(_) => 40101,
            Error::KafkaAuthorizationFailed(_) => 40301,
            Error::PartitionNotFound(_) => 40401,
            Error::ConsumerNotFound { .. } => 40402,
            Error::SchemaNotFound(_) => 40451,
            Error::SubjectNotFound(_) => 40452,
            Error::SchemaVersionNotFound(_) => 40453,
            Error::FormatMismatch { .. } => 40601,
            Error::ConsumerAlreadyExists { .. } => 40901,
            Error::KafkaRetriable(_) => 2001,
            Error::Kafka(_) => 2002,
            Error::UnexpectedNonKafka(_) => 2003,
            Error::PoolFull(_) => 3001,
            Error::CommitFailed(_) => 3002,
            Error::InvalidSchema(_) => 4001,
            Error::InvalidSchemaVersion(_) => 4002,
            Error::InvalidCompatibility(_) => 4003,
            Error::ModeConflict(_) => 4004,
            Error::UnprocessableSchema(_) => 4005,
            Error::RegistryBackend(_) => 4006,
            Error::RegistryForwarding(_) => 4007,
            Error::RegistryTimedOut(_) => 4008,
            Error::RegistryInternal(_) => 4009,
            Error::JsonToObject(_) => 5001,
            Error::AvroToJson(_) => 5002,
            Error::JsonSchemaToJson(_) => 5003,
            Error::ProtobufToJson(_) => 5004,
        }
    }

    /// HTTP status code for this error kind.
    ///
    /// Codes of five digits carry their status in the leading three digits;
    /// the 110xx/111xx request-validation family maps to 400; everything
    /// else is a server-side failure.
    pub fn status(&self) -> u16 {
        let code = self.code();
        if (11000..11200).contains(&code) {
            400
        } else if code >= 10000 {
            (code / 100) as u16
        } else {
            500
        }
    }

    /// Short, stable message for this error kind (no detail).
    pub fn message(&self) -> &'static str {
        match self {
            Error::InvalidDataFormat(_) => "Invalid data format",
            Error::InvalidFormatType(_) => "Invalid format type",
            Error::InvalidEmbeddedFormat(_) => "Invalid embedded format",
            Error::KeySchemaMissing => "Request includes keys but does not include key schema",
            Error::ValueSchemaMissing => {
                "Request includes values but does not include value schema"
            }
            Error::KafkaAuthenticationFailed(_) => "Kafka authentication failed",
            Error::KafkaAuthorizationFailed(_) => "Kafka authorization failed",
            Error::PartitionNotFound(_) => "Partition not found",
            Error::ConsumerNotFound { .. } => "Consumer instance not found",
            Error::SchemaNotFound(_) => "Schema not found",
            Error::SubjectNotFound(_) => "Subject not found",
            Error::SchemaVersionNotFound(_) => "Schema version not found",
            Error::FormatMismatch { .. } => {
                "The requested embedded data format does not match the deserializer for this consumer instance"
            }
            Error::ConsumerAlreadyExists { .. } => {
                "Consumer with specified consumer ID already exists in the specified consumer group."
            }
            Error::KafkaRetriable(_) => "Kafka retriable failed",
            Error::Kafka(_) => "Kafka error",
            Error::UnexpectedNonKafka(_) => "Unexpected non-Kafka exception returned by Kafka",
            Error::PoolFull(_) => "No Consumer pool resources",
            Error::CommitFailed(_) => "Consumer commit offsets failed",
            Error::InvalidSchema(_) => "Invalid schema",
            Error::InvalidSchemaVersion(_) => "Invalid schema version",
            Error::InvalidCompatibility(_) => "Invalid compatibility level",
            Error::ModeConflict(_) => "Request subject is in read-only mode",
            Error::UnprocessableSchema(_) => "Unprocessable schema",
            Error::RegistryBackend(_) => "Schema Registry error in the backend data store",
            Error::RegistryForwarding(_) => {
                "Schema Registry error while forwarding the request to the master"
            }
            Error::RegistryTimedOut(_) => "Schema Registry operation timed out",
            Error::RegistryInternal(_) => "Schema Registry internal server error",
            Error::JsonToObject(_) => "Failed to convert JSON to Object",
            Error::AvroToJson(_) => "Failed to convert Avro to JSON",
            Error::JsonSchemaToJson(_) => "Failed to convert JSON Schema to JSON",
            Error::ProtobufToJson(_) => "Failed to convert Protobuf to JSON",
        }
    }

    /// True for every error whose status is 404.
    ///
    /// Schema lookups use this to decide between negative caching and
    /// registering a new schema.
    pub fn is_not_found(&self) -> bool {
        self.status() == 404
    }
}

/// Classify a broker client error.
///
/// Errors without a librdkafka error code did not come from the broker
/// protocol and are reported as unexpected.
impl From<KafkaError> for Error {
    fn from(err: KafkaError) -> Self {
        let detail = err.to_string();
        if matches!(
            err,
            KafkaError::ClientConfig(..) | KafkaError::ClientCreation(_)
        ) {
            return Error::Kafka(detail);
        }
        match err.rdkafka_error_code() {
            Some(code) if is_authentication_failure(code) => {
                Error::KafkaAuthenticationFailed(detail)
            }
            Some(code) if is_authorization_failure(code) => Error::KafkaAuthorizationFailed(detail),
            Some(RDKafkaErrorCode::UnknownPartition) => Error::PartitionNotFound(detail),
            Some(code) if is_retriable(code) => Error::KafkaRetriable(detail),
            Some(_) => Error::Kafka(detail),
            None => Error::UnexpectedNonKafka(detail),
        }
    }
}

fn is_authentication_failure(code: RDKafkaErrorCode) -> bool {
    matches!(
        code,
        RDKafkaErrorCode::Authentication | RDKafkaErrorCode::SaslAuthenticationFailed
    )
}

fn is_authorization_failure(code: RDKafkaErrorCode) -> bool {
    matches!(
        code,
        RDKafkaErrorCode::TopicAuthorizationFailed
            | RDKafkaErrorCode::GroupAuthorizationFailed
            | RDKafkaErrorCode::ClusterAuthorizationFailed
            | RDKafkaErrorCode::TransactionalIdAuthorizationFailed
    )
}

fn is_retriable(code: RDKafkaErrorCode) -> bool {
    matches!(
        code,
        RDKafkaErrorCode::MessageTimedOut
            | RDKafkaErrorCode::RequestTimedOut
            | RDKafkaErrorCode::OperationTimedOut
            | RDKafkaErrorCode::QueueFull
            | RDKafkaErrorCode::BrokerTransportFailure
            | RDKafkaErrorCode::AllBrokersDown
            | RDKafkaErrorCode::UnknownTopicOrPartition
            | RDKafkaErrorCode::LeaderNotAvailable
            | RDKafkaErrorCode::NotLeaderForPartition
            | RDKafkaErrorCode::BrokerNotAvailable
            | RDKafkaErrorCode::NetworkException
            | RDKafkaErrorCode::NotEnoughReplicas
            | RDKafkaErrorCode::NotEnoughReplicasAfterAppend
            | RDKafkaErrorCode::CoordinatorLoadInProgress
            | RDKafkaErrorCode::CoordinatorNotAvailable
            | RDKafkaErrorCode::NotCoordinator
            | RDKafkaErrorCode::KafkaStorageError
    )
}

pub type Result<T> = std::result::Result<T, Error>;
