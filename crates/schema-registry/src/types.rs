//! Registry request and response bodies.

use kafka_rest_types::SchemaType;
use serde::{Deserialize, Serialize};

/// Body of lookup (`POST /subjects/{subject}`) and register
/// (`POST /subjects/{subject}/versions`) requests.
#[derive(Debug, Serialize)]
pub struct SchemaRequest<'a> {
    pub schema: &'a str,
    #[serde(rename = "schemaType")]
    pub schema_type: SchemaType,
}

/// Any schema-bearing registry response.
///
/// Which fields are present depends on the endpoint: `GET /schemas/ids/{id}`
/// returns only the schema text, register returns only the id.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaResponse {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub id: Option<i32>,
    #[serde(default)]
    pub version: Option<i32>,
    #[serde(default)]
    pub schema: Option<String>,
    /// Omitted by the registry for AVRO schemas
    #[serde(default, rename = "schemaType")]
    pub schema_type: Option<SchemaType>,
}

#[derive(Debug, Deserialize)]
pub struct RegistryErrorBody {
    pub error_code: i32,
    #[serde(default)]
    pub message: String,
}
