//! JSON tree → protobuf binary.

use super::parser::{ProtoFieldDescriptor, ProtoMessageDescriptor, ProtoSchema, ProtoType};
use super::{ProtoError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use protobuf::CodedOutputStream;
use serde_json::{Map, Value};

/// Runtime protobuf encoder.
///
/// Accepts the same shape [`super::ProtoDecoder`] produces. Object keys may be
/// either proto field names or their lowerCamelCase JSON names; keys that do
/// not name a field are rejected. `null` fields are left unset.
pub struct ProtoEncoder<'a> {
    schema: &'a ProtoSchema,
}

impl<'a> ProtoEncoder<'a> {
    pub fn new(schema: &'a ProtoSchema) -> Self {
        Self { schema }
    }

    /// Encode a JSON object as the schema's root message type.
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        let descriptor = self.schema.root_message()?;
        self.encode_as(descriptor, value)
    }

    pub fn encode_as(&self, descriptor: &ProtoMessageDescriptor, value: &Value) -> Result<Vec<u8>> {
        let object = value.as_object().ok_or_else(|| {
            ProtoError::Encode(format!(
                "Expected a JSON object for message {}, got {value}",
                descriptor.name
            ))
        })?;
        self.encode_message(descriptor, object)
    }

    fn encode_message(
        &self,
        descriptor: &ProtoMessageDescriptor,
        object: &Map<String, Value>,
    ) -> Result<Vec<u8>> {
        for key in object.keys() {
            if descriptor.get_field(key).is_none() {
                return Err(ProtoError::Encode(format!(
                    "Unknown field '{key}' for message {}",
                    descriptor.name
                )));
            }
        }

        let mut buf = Vec::new();
        {
            let mut stream = CodedOutputStream::vec(&mut buf);
            for field_name in &descriptor.field_order {
                let Some(field_desc) = descriptor.fields.get(field_name) else {
                    continue;
                };
                let value = object
                    .get(&field_desc.name)
                    .or_else(|| object.get(&field_desc.json_name));
                let Some(value) = value else {
                    continue;
                };
                if value.is_null() {
                    continue;
                }
                self.encode_field(&mut stream, field_desc, value)?;
            }
            stream.flush().map_err(encode_err)?;
        }
        Ok(buf)
    }

    fn encode_field(
        &self,
        stream: &mut CodedOutputStream,
        field_desc: &ProtoFieldDescriptor,
        value: &Value,
    ) -> Result<()> {
        if !field_desc.is_repeated {
            return self.encode_single(stream, field_desc, value);
        }

        if let Some(entry_desc) = self.map_entry(field_desc) {
            let object = value.as_object().ok_or_else(|| {
                ProtoError::Encode(format!(
                    "Map field '{}' expects a JSON object, got {value}",
                    field_desc.name
                ))
            })?;
            for (key, entry_value) in object {
                let mut entry = Map::new();
                entry.insert("key".to_string(), map_key(entry_desc, key)?);
                entry.insert("value".to_string(), entry_value.clone());
                let bytes = self.encode_message(entry_desc, &entry)?;
                stream
                    .write_bytes(field_desc.number, &bytes)
                    .map_err(encode_err)?;
            }
            return Ok(());
        }

        let items = value.as_array().ok_or_else(|| {
            ProtoError::Encode(format!(
                "Repeated field '{}' expects a JSON array, got {value}",
                field_desc.name
            ))
        })?;
        for item in items {
            self.encode_single(stream, field_desc, item)?;
        }
        Ok(())
    }

    fn map_entry(&self, field_desc: &ProtoFieldDescriptor) -> Option<&ProtoMessageDescriptor> {
        match &field_desc.field_type {
            ProtoType::Message(type_name) => self
                .schema
                .get_message(type_name)
                .ok()
                .filter(|m| m.is_map_entry),
            _ => None,
        }
    }

    fn encode_single(
        &self,
        stream: &mut CodedOutputStream,
        field_desc: &ProtoFieldDescriptor,
        value: &Value,
    ) -> Result<()> {
        let number = field_desc.number;
        let name = &field_desc.name;
        match &field_desc.field_type {
            ProtoType::Double => stream.write_double(number, as_f64(name, value)?),
            ProtoType::Float => stream.write_float(number, as_f64(name, value)? as f32),
            ProtoType::Int32 => stream.write_int32(number, as_i32(name, value)?),
            ProtoType::Sint32 => stream.write_sint32(number, as_i32(name, value)?),
            ProtoType::Sfixed32 => stream.write_sfixed32(number, as_i32(name, value)?),
            ProtoType::Int64 => stream.write_int64(number, as_i64(name, value)?),
            ProtoType::Sint64 => stream.write_sint64(number, as_i64(name, value)?),
            ProtoType::Sfixed64 => stream.write_sfixed64(number, as_i64(name, value)?),
            ProtoType::Uint32 => stream.write_uint32(number, as_u32(name, value)?),
            ProtoType::Fixed32 => stream.write_fixed32(number, as_u32(name, value)?),
            ProtoType::Uint64 => stream.write_uint64(number, as_u64(name, value)?),
            ProtoType::Fixed64 => stream.write_fixed64(number, as_u64(name, value)?),
            ProtoType::Bool => {
                let b = value.as_bool().ok_or_else(|| type_err(name, "bool", value))?;
                stream.write_bool(number, b)
            }
            ProtoType::String => {
                let s = value
                    .as_str()
                    .ok_or_else(|| type_err(name, "string", value))?;
                stream.write_string(number, s)
            }
            ProtoType::Bytes => {
                let s = value
                    .as_str()
                    .ok_or_else(|| type_err(name, "base64 string", value))?;
                let bytes = BASE64.decode(s).map_err(|e| {
                    ProtoError::Encode(format!("Field '{name}' is not valid base64: {e}"))
                })?;
                stream.write_bytes(number, &bytes)
            }
            ProtoType::Enum(type_name) => {
                let n = self.enum_number(name, type_name, value)?;
                stream.write_enum(number, n)
            }
            ProtoType::Message(type_name) => {
                let nested_desc = self.schema.get_message(type_name)?;
                let bytes = self.encode_as(nested_desc, value)?;
                stream.write_bytes(number, &bytes)
            }
        }
        .map_err(encode_err)
    }

    fn enum_number(&self, field: &str, type_name: &str, value: &Value) -> Result<i32> {
        if let Some(symbol) = value.as_str() {
            let enum_desc = self
                .schema
                .get_enum(type_name)
                .ok_or_else(|| ProtoError::Encode(format!("Unknown enum type {type_name}")))?;
            return enum_desc.values.get(symbol).copied().ok_or_else(|| {
                ProtoError::Encode(format!(
                    "'{symbol}' is not a symbol of enum {type_name} (field '{field}')"
                ))
            });
        }
        as_i32(field, value)
    }
}

/// Map keys are always JSON strings; coerce them to the entry's key type.
fn map_key(entry_desc: &ProtoMessageDescriptor, key: &str) -> Result<Value> {
    let key_type = entry_desc
        .fields
        .get("key")
        .map(|f| &f.field_type)
        .ok_or_else(|| ProtoError::Encode(format!("{} has no key field", entry_desc.name)))?;
    Ok(match key_type {
        ProtoType::String => Value::from(key),
        ProtoType::Bool => match key {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => return Err(ProtoError::Encode(format!("Invalid bool map key '{key}'"))),
        },
        _ => {
            let n: i64 = key
                .parse()
                .map_err(|_| ProtoError::Encode(format!("Invalid integer map key '{key}'")))?;
            Value::from(n)
        }
    })
}

fn type_err(field: &str, expected: &str, value: &Value) -> ProtoError {
    ProtoError::Encode(format!("Field '{field}' expects {expected}, got {value}"))
}

fn as_f64(field: &str, value: &Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| type_err(field, "a number", value))
}

fn as_i64(field: &str, value: &Value) -> Result<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| type_err(field, "a signed 64-bit integer", value))
}

fn as_u64(field: &str, value: &Value) -> Result<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| type_err(field, "an unsigned 64-bit integer", value))
}

fn as_i32(field: &str, value: &Value) -> Result<i32> {
    let n = as_i64(field, value)?;
    i32::try_from(n).map_err(|_| type_err(field, "a 32-bit integer", value))
}

fn as_u32(field: &str, value: &Value) -> Result<u32> {
    let n = as_u64(field, value)?;
    u32::try_from(n).map_err(|_| type_err(field, "an unsigned 32-bit integer", value))
}

fn encode_err(e: protobuf::Error) -> ProtoError {
    ProtoError::Encode(e.to_string())
}
