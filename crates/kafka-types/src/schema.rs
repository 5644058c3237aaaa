//! Registered schemas and subject naming.

use crate::format::SchemaType;
use serde::{Deserialize, Serialize};

/// A schema as known to the registry.
///
/// Immutable once fetched; the schema cache stores it under its id, its raw
/// text and its version at the same time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredSchema {
    /// `{topic}-key` or `{topic}-value`
    pub subject: String,
    pub schema_id: i32,
    pub schema_version: i32,
    /// Raw schema text exactly as registered
    pub schema: String,
    pub schema_type: SchemaType,
}

/// Subject a topic's key or value schema is registered under.
pub fn subject_name(topic: &str, is_key: bool) -> String {
    if is_key {
        format!("{topic}-key")
    } else {
        format!("{topic}-value")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_name() {
        assert_eq!(subject_name("orders", true), "orders-key");
        assert_eq!(subject_name("orders", false), "orders-value");
    }
}
