//! kafka-rest-proxy
//!
//! An HTTP gateway exposing Kafka produce and consume as short-lived REST
//! sessions, speaking the Confluent REST Proxy v2 API.
//!
//! # Workspace crates
//!
//! - `kafka_rest_types` - shared records, coordinates and the error taxonomy
//! - `kafka_rest_codec` - Avro, JSON Schema and Protobuf codecs and the wire envelope
//! - `kafka_rest_schema_registry` - cached schema registry access
//! - `kafka_rest_consumer` - consumer session pool and bounded reads
//! - `kafka_rest_producer` - the shared producer session
//!
//! # CLI Usage
//!
//! ```bash
//! kafka-rest-proxy \
//!   --bootstrap-servers localhost:9092 \
//!   --schema-registry-url http://localhost:8081 \
//!   --listen 0.0.0.0:8082
//! ```

pub mod app;
pub mod config;
pub mod consume;
pub mod dto;
pub mod http;
pub mod produce;

pub use app::App;
pub use config::ProxyConfig;
