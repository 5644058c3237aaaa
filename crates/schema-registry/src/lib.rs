//! Schema registry access for kafka-rest-proxy.
//!
//! - [`client`] - uncached HTTP calls and registry error mapping
//! - [`cache`] - TTL-bounded positive and negative caches
//! - [`manager`] - cached operations serialized per subject, and the
//!   id / raw schema / latest resolution used by produce and consume calls

pub mod cache;
pub mod client;
pub mod manager;
pub mod types;

pub use cache::{CacheConfig, SchemaCaches};
pub use client::{map_registry_error, RegistryConfig, SchemaRegistryClient};
pub use manager::{CachedSchemaManager, SchemaManager};
