//! Shared types for kafka-rest-proxy.
//!
//! Every other crate in the workspace depends on this one for:
//!
//! - [`error`] - the gateway error taxonomy, each kind carrying a stable
//!   `(http status, numeric code, message)` triple
//! - [`format`] - embedded message formats and registry schema types
//! - [`message`] - raw records pulled from the broker and the converted
//!   records handed back to HTTP callers
//! - [`partition`] - topic/partition/offset coordinates
//! - [`schema`] - registered schemas and subject naming
//! - [`settings`] - broker connection settings shared by consumer and producer clients

pub mod error;
pub mod format;
pub mod message;
pub mod partition;
pub mod schema;
pub mod settings;

pub use error::{Error, Result};
pub use format::{EmbeddedFormat, SchemaType};
pub use message::{ConsumerRecord, RawRecord, RecordData};
pub use partition::{TopicPartition, TopicPartitionOffset};
pub use schema::{subject_name, RegisteredSchema};
pub use settings::{BrokerSettings, SaslMechanism, SecurityProtocol};
