use super::{ProtoError, Result};
use protobuf::descriptor::field_descriptor_proto::{Label, Type};
use protobuf::descriptor::{DescriptorProto, EnumDescriptorProto, FieldDescriptorProto};
use protobuf_parse::Parser;
use std::collections::HashMap;
use std::path::Path;

/// Represents a parsed protobuf schema
#[derive(Debug, Clone)]
pub struct ProtoSchema {
    /// Message descriptors keyed by fully qualified name (e.g. "shop.v1.Order.Line")
    pub(crate) messages: HashMap<String, ProtoMessageDescriptor>,
    /// Enum descriptors keyed by fully qualified name
    pub(crate) enums: HashMap<String, ProtoEnumDescriptor>,
    /// Top-level message names in declaration order
    pub(crate) message_order: Vec<String>,
}

/// Describes a protobuf message type
#[derive(Debug, Clone)]
pub struct ProtoMessageDescriptor {
    /// Fully qualified message name (e.g., "mypackage.MyMessage")
    pub name: String,
    /// Map of field names to their descriptors
    pub fields: HashMap<String, ProtoFieldDescriptor>,
    /// Ordered list of field names
    pub field_order: Vec<String>,
    /// Synthetic `XxxEntry` message generated for a `map<K, V>` field
    pub is_map_entry: bool,
}

/// Describes a single field in a message
#[derive(Debug, Clone)]
pub struct ProtoFieldDescriptor {
    /// Field name
    pub name: String,
    /// lowerCamelCase name used by the canonical JSON mapping
    pub json_name: String,
    /// Field number (tag)
    pub number: u32,
    /// Field type
    pub field_type: ProtoType,
    /// Whether the field is repeated
    pub is_repeated: bool,
}

#[derive(Debug, Clone)]
pub struct ProtoEnumDescriptor {
    pub name: String,
    /// Symbol → number
    pub values: HashMap<String, i32>,
}

impl ProtoEnumDescriptor {
    pub fn symbol(&self, number: i32) -> Option<&str> {
        self.values
            .iter()
            .find(|(_, n)| **n == number)
            .map(|(name, _)| name.as_str())
    }
}

/// Protobuf field types
#[derive(Debug, Clone, PartialEq)]
pub enum ProtoType {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
    Message(String), // Fully qualified message type name
    Enum(String),    // Fully qualified enum type name
}

impl std::fmt::Display for ProtoType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtoType::Double => f.write_str("double"),
            ProtoType::Float => f.write_str("float"),
            ProtoType::Int32 => f.write_str("int32"),
            ProtoType::Int64 => f.write_str("int64"),
            ProtoType::Uint32 => f.write_str("uint32"),
            ProtoType::Uint64 => f.write_str("uint64"),
            ProtoType::Sint32 => f.write_str("sint32"),
            ProtoType::Sint64 => f.write_str("sint64"),
            ProtoType::Fixed32 => f.write_str("fixed32"),
            ProtoType::Fixed64 => f.write_str("fixed64"),
            ProtoType::Sfixed32 => f.write_str("sfixed32"),
            ProtoType::Sfixed64 => f.write_str("sfixed64"),
            ProtoType::Bool => f.write_str("bool"),
            ProtoType::String => f.write_str("string"),
            ProtoType::Bytes => f.write_str("bytes"),
            ProtoType::Message(name) => write!(f, "message:{name}"),
            ProtoType::Enum(name) => write!(f, "enum:{name}"),
        }
    }
}

impl ProtoType {
    /// Scalar types that proto3 encodes packed when repeated.
    pub fn is_packable(&self) -> bool {
        !matches!(
            self,
            ProtoType::String | ProtoType::Bytes | ProtoType::Message(_)
        )
    }
}

impl ProtoSchema {
    /// Parse a .proto file and create a schema
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();

        let mut parser = Parser::new();
        parser.pure();
        parser.input(p);
        if let Some(parent) = p.parent() {
            parser.include(parent);
        }

        let parsed = parser
            .parse_and_typecheck()
            .map_err(|e| ProtoError::Parse(e.to_string()))?;

        let mut schema = ProtoSchema {
            messages: HashMap::new(),
            enums: HashMap::new(),
            message_order: Vec::new(),
        };

        for file_descriptor in parsed.file_descriptors {
            let prefix = file_descriptor.package.clone().unwrap_or_default();

            for enum_type in &file_descriptor.enum_type {
                schema.add_enum(&prefix, enum_type);
            }
            for message in &file_descriptor.message_type {
                let name = qualify(&prefix, message.name());
                schema.message_order.push(name);
                schema.add_message(&prefix, message)?;
            }
        }

        Ok(schema)
    }

    /// Parse a .proto file content from string
    pub fn from_string(content: &str) -> Result<Self> {
        use std::io::Write;
        use tempfile::Builder;

        // protobuf-parse only accepts input files with a .proto extension
        let mut temp_file = Builder::new()
            .suffix(".proto")
            .tempfile()
            .map_err(|e| ProtoError::Parse(format!("Failed to create temp file: {e}")))?;
        temp_file
            .write_all(content.as_bytes())
            .map_err(|e| ProtoError::Parse(format!("Failed to write temp file: {e}")))?;

        Self::from_file(temp_file.path())
    }

    fn add_message(&mut self, prefix: &str, message: &DescriptorProto) -> Result<()> {
        let name = qualify(prefix, message.name());

        let mut fields = HashMap::new();
        let mut field_order = Vec::new();
        for field in &message.field {
            let field_name = field.name().to_string();
            if field_name.is_empty() {
                continue;
            }
            let descriptor = ProtoFieldDescriptor {
                json_name: field
                    .json_name
                    .clone()
                    .unwrap_or_else(|| lower_camel_case(&field_name)),
                number: u32::try_from(field.number()).map_err(|_| {
                    ProtoError::Parse(format!("Invalid field number for {name}.{field_name}"))
                })?,
                field_type: Self::parse_field_type(field)?,
                is_repeated: field.label() == Label::LABEL_REPEATED,
                name: field_name.clone(),
            };
            field_order.push(field_name.clone());
            fields.insert(field_name, descriptor);
        }

        for enum_type in &message.enum_type {
            self.add_enum(&name, enum_type);
        }
        for nested in &message.nested_type {
            self.add_message(&name, nested)?;
        }

        let is_map_entry = message
            .options
            .as_ref()
            .map(|o| o.map_entry())
            .unwrap_or(false);

        self.messages.insert(
            name.clone(),
            ProtoMessageDescriptor {
                name,
                fields,
                field_order,
                is_map_entry,
            },
        );
        Ok(())
    }

    fn add_enum(&mut self, prefix: &str, enum_type: &EnumDescriptorProto) {
        let name = qualify(prefix, enum_type.name());
        let values = enum_type
            .value
            .iter()
            .map(|v| (v.name().to_string(), v.number()))
            .collect();
        self.enums
            .insert(name.clone(), ProtoEnumDescriptor { name, values });
    }

    fn parse_field_type(field: &FieldDescriptorProto) -> Result<ProtoType> {
        let type_name = || field.type_name().trim_start_matches('.').to_string();

        Ok(match field.type_() {
            Type::TYPE_DOUBLE => ProtoType::Double,
            Type::TYPE_FLOAT => ProtoType::Float,
            Type::TYPE_INT64 => ProtoType::Int64,
            Type::TYPE_UINT64 => ProtoType::Uint64,
            Type::TYPE_INT32 => ProtoType::Int32,
            Type::TYPE_FIXED64 => ProtoType::Fixed64,
            Type::TYPE_FIXED32 => ProtoType::Fixed32,
            Type::TYPE_BOOL => ProtoType::Bool,
            Type::TYPE_STRING => ProtoType::String,
            Type::TYPE_MESSAGE => ProtoType::Message(type_name()),
            Type::TYPE_BYTES => ProtoType::Bytes,
            Type::TYPE_UINT32 => ProtoType::Uint32,
            Type::TYPE_ENUM => ProtoType::Enum(type_name()),
            Type::TYPE_SFIXED32 => ProtoType::Sfixed32,
            Type::TYPE_SFIXED64 => ProtoType::Sfixed64,
            Type::TYPE_SINT32 => ProtoType::Sint32,
            Type::TYPE_SINT64 => ProtoType::Sint64,
            Type::TYPE_GROUP => {
                return Err(ProtoError::Parse(
                    "TYPE_GROUP is Proto2 syntax only and deprecated hence not supported"
                        .to_string(),
                ))
            }
        })
    }

    /// The record type: the first message declared in the schema.
    pub fn root_message(&self) -> Result<&ProtoMessageDescriptor> {
        let name = self
            .message_order
            .first()
            .ok_or_else(|| ProtoError::Parse("Schema declares no message types".to_string()))?;
        self.get_message(name)
    }

    /// Get a message descriptor by fully qualified or simple name
    pub fn get_message(&self, name: &str) -> Result<&ProtoMessageDescriptor> {
        let name = name.trim_start_matches('.');
        self.messages
            .get(name)
            .or_else(|| {
                self.messages
                    .values()
                    .find(|m| m.name.rsplit('.').next() == Some(name))
            })
            .ok_or_else(|| ProtoError::MessageTypeNotFound(name.to_string()))
    }

    pub fn get_enum(&self, name: &str) -> Option<&ProtoEnumDescriptor> {
        self.enums.get(name.trim_start_matches('.'))
    }

    /// List all message types in the schema
    pub fn list_messages(&self) -> Vec<String> {
        self.messages.keys().cloned().collect()
    }
}

impl ProtoMessageDescriptor {
    /// Get a field descriptor by its proto name or its JSON name
    pub fn get_field(&self, name: &str) -> Option<&ProtoFieldDescriptor> {
        self.fields
            .get(name)
            .or_else(|| self.fields.values().find(|f| f.json_name == name))
    }

    pub fn field_by_number(&self, number: u32) -> Option<&ProtoFieldDescriptor> {
        self.fields.values().find(|f| f.number == number)
    }

    /// List all field names in order
    pub fn list_fields(&self) -> &[String] {
        &self.field_order
    }
}

fn qualify(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn lower_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_message() {
        let proto = r#"
            syntax = "proto3";

            message User {
                string name = 1;
                int32 age = 2;
                bool active = 3;
            }
        "#;

        let schema = ProtoSchema::from_string(proto).expect("Failed to parse proto");
        assert_eq!(schema.messages.len(), 1);

        let user_msg = schema.get_message("User").expect("User message not found");
        assert_eq!(user_msg.fields.len(), 3);

        let name_field = user_msg.get_field("name").expect("name field not found");
        assert_eq!(name_field.number, 1);
        assert_eq!(name_field.field_type, ProtoType::String);
        assert!(!name_field.is_repeated);

        let age_field = user_msg.get_field("age").expect("age field not found");
        assert_eq!(age_field.field_type, ProtoType::Int32);
    }

    #[test]
    fn test_root_message_is_first_declared() {
        let proto = r#"
            syntax = "proto3";
            package shop.v1;

            message Order {
                string order_id = 1;
                repeated Line lines = 2;
            }

            message Line {
                string sku = 1;
                uint32 quantity = 2;
            }
        "#;

        let schema = ProtoSchema::from_string(proto).expect("Failed to parse proto");
        let root = schema.root_message().expect("root message");
        assert_eq!(root.name, "shop.v1.Order");

        let lines = root.get_field("lines").expect("lines field");
        assert!(lines.is_repeated);
        assert_eq!(
            lines.field_type,
            ProtoType::Message("shop.v1.Line".to_string())
        );
    }

    #[test]
    fn test_nested_messages_and_enums() {
        let proto = r#"
            syntax = "proto3";

            message Envelope {
                enum Kind {
                    UNKNOWN = 0;
                    CREATED = 1;
                }
                message Header {
                    string trace_id = 1;
                }
                Kind kind = 1;
                Header header = 2;
            }
        "#;

        let schema = ProtoSchema::from_string(proto).expect("Failed to parse proto");
        assert!(schema.get_message("Envelope.Header").is_ok());

        let kind = schema.get_enum("Envelope.Kind").expect("enum registered");
        assert_eq!(kind.values.get("CREATED"), Some(&1));
        assert_eq!(kind.symbol(0), Some("UNKNOWN"));

        let header = schema.get_message("Envelope.Header").unwrap();
        assert_eq!(header.get_field("traceId").unwrap().name, "trace_id");
    }

    #[test]
    fn test_map_field_produces_entry_message() {
        let proto = r#"
            syntax = "proto3";

            message Labels {
                map<string, int64> counts = 1;
            }
        "#;

        let schema = ProtoSchema::from_string(proto).expect("Failed to parse proto");
        let entry = schema
            .get_message("Labels.CountsEntry")
            .expect("map entry message");
        assert!(entry.is_map_entry);
        assert_eq!(entry.list_fields(), &["key", "value"]);
    }

    #[test]
    fn test_parse_invalid_proto() {
        let proto = r#"
            syntax = "proto3";

            message InvalidMessage {
                string name
            }
        "#;

        assert!(ProtoSchema::from_string(proto).is_err());
    }

    #[test]
    fn test_get_nonexistent_message() {
        let proto = r#"
            syntax = "proto3";
            message User { string name = 1; }
        "#;

        let schema = ProtoSchema::from_string(proto).expect("Failed to parse proto");
        assert!(schema.get_message("NonExistent").is_err());
    }

    #[test]
    fn test_proto_type_display() {
        assert_eq!(ProtoType::Sint64.to_string(), "sint64");
        assert_eq!(
            ProtoType::Message("Address".to_string()).to_string(),
            "message:Address"
        );
        assert_eq!(
            ProtoType::Enum("Status".to_string()).to_string(),
            "enum:Status"
        );
    }

    #[test]
    fn test_lower_camel_case() {
        assert_eq!(lower_camel_case("created_at_ms"), "createdAtMs");
        assert_eq!(lower_camel_case("id"), "id");
    }
}
