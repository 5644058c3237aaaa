//! Protobuf binary → JSON tree.

use super::parser::{ProtoFieldDescriptor, ProtoMessageDescriptor, ProtoSchema, ProtoType};
use super::{ProtoError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use protobuf::CodedInputStream;
use serde_json::{Map, Value};

const WIRE_VARINT: u32 = 0;
const WIRE_FIXED64: u32 = 1;
const WIRE_LENGTH_DELIMITED: u32 = 2;
const WIRE_FIXED32: u32 = 5;

/// Runtime protobuf decoder.
///
/// Fields are rendered under their proto names; bytes become base64 text and
/// enums their symbol name. Fields absent from the payload are omitted and
/// unknown field numbers are skipped.
pub struct ProtoDecoder<'a> {
    schema: &'a ProtoSchema,
}

impl<'a> ProtoDecoder<'a> {
    pub fn new(schema: &'a ProtoSchema) -> Self {
        Self { schema }
    }

    /// Decode a payload of the schema's root message type.
    pub fn decode(&self, data: &[u8]) -> Result<Value> {
        let descriptor = self.schema.root_message()?;
        self.decode_as(descriptor, data)
    }

    pub fn decode_as(&self, descriptor: &ProtoMessageDescriptor, data: &[u8]) -> Result<Value> {
        let mut stream = CodedInputStream::from_bytes(data);
        Ok(Value::Object(self.decode_message(descriptor, &mut stream)?))
    }

    fn decode_message(
        &self,
        descriptor: &ProtoMessageDescriptor,
        stream: &mut CodedInputStream,
    ) -> Result<Map<String, Value>> {
        let mut fields = Map::new();

        while !stream.eof().map_err(decode_err)? {
            let tag = stream.read_raw_varint32().map_err(decode_err)?;
            if tag == 0 {
                break;
            }
            let field_number = tag >> 3;
            let wire_type = tag & 0x7;

            let Some(field_desc) = descriptor.field_by_number(field_number) else {
                skip_field(stream, wire_type)?;
                continue;
            };

            if !field_desc.is_repeated {
                let value = self.decode_field_value(field_desc, stream)?;
                fields.insert(field_desc.name.clone(), value);
                continue;
            }

            if self.is_map_field(field_desc) {
                let entry = self.decode_field_value(field_desc, stream)?;
                let slot = fields
                    .entry(field_desc.name.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                if let (Value::Object(map), Value::Object(mut entry)) = (slot, entry) {
                    let key = match entry.remove("key") {
                        Some(Value::String(s)) => s,
                        Some(other) => other.to_string(),
                        None => String::new(),
                    };
                    map.insert(key, entry.remove("value").unwrap_or(Value::Null));
                }
                continue;
            }

            let mut decoded = Vec::new();
            if wire_type == WIRE_LENGTH_DELIMITED && field_desc.field_type.is_packable() {
                let len = stream.read_raw_varint64().map_err(decode_err)?;
                let old_limit = stream.push_limit(len).map_err(decode_err)?;
                while !stream.eof().map_err(decode_err)? {
                    decoded.push(self.decode_field_value(field_desc, stream)?);
                }
                stream.pop_limit(old_limit);
            } else {
                decoded.push(self.decode_field_value(field_desc, stream)?);
            }

            let slot = fields
                .entry(field_desc.name.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(values) = slot {
                values.extend(decoded);
            }
        }

        Ok(fields)
    }

    fn is_map_field(&self, field_desc: &ProtoFieldDescriptor) -> bool {
        match &field_desc.field_type {
            ProtoType::Message(type_name) => self
                .schema
                .get_message(type_name)
                .map(|m| m.is_map_entry)
                .unwrap_or(false),
            _ => false,
        }
    }

    fn decode_field_value(
        &self,
        field_desc: &ProtoFieldDescriptor,
        stream: &mut CodedInputStream,
    ) -> Result<Value> {
        Ok(match &field_desc.field_type {
            ProtoType::Double => Value::from(stream.read_double().map_err(decode_err)?),
            ProtoType::Float => Value::from(stream.read_float().map_err(decode_err)? as f64),
            ProtoType::Int32 => Value::from(stream.read_int32().map_err(decode_err)?),
            ProtoType::Sint32 => Value::from(stream.read_sint32().map_err(decode_err)?),
            ProtoType::Sfixed32 => Value::from(stream.read_sfixed32().map_err(decode_err)?),
            ProtoType::Int64 => Value::from(stream.read_int64().map_err(decode_err)?),
            ProtoType::Sint64 => Value::from(stream.read_sint64().map_err(decode_err)?),
            ProtoType::Sfixed64 => Value::from(stream.read_sfixed64().map_err(decode_err)?),
            ProtoType::Uint32 => Value::from(stream.read_uint32().map_err(decode_err)?),
            ProtoType::Fixed32 => Value::from(stream.read_fixed32().map_err(decode_err)?),
            ProtoType::Uint64 => Value::from(stream.read_uint64().map_err(decode_err)?),
            ProtoType::Fixed64 => Value::from(stream.read_fixed64().map_err(decode_err)?),
            ProtoType::Bool => Value::from(stream.read_bool().map_err(decode_err)?),
            ProtoType::String => Value::from(stream.read_string().map_err(decode_err)?),
            ProtoType::Bytes => {
                let bytes = stream.read_bytes().map_err(decode_err)?;
                Value::from(BASE64.encode(bytes))
            }
            ProtoType::Enum(type_name) => {
                let number = stream.read_int32().map_err(decode_err)?;
                match self.schema.get_enum(type_name).and_then(|e| e.symbol(number)) {
                    Some(symbol) => Value::from(symbol),
                    None => Value::from(number),
                }
            }
            ProtoType::Message(type_name) => {
                let len = stream.read_raw_varint64().map_err(decode_err)?;
                let old_limit = stream.push_limit(len).map_err(decode_err)?;
                let nested_descriptor = self.schema.get_message(type_name)?;
                let nested = self.decode_message(nested_descriptor, stream)?;
                stream.pop_limit(old_limit);
                Value::Object(nested)
            }
        })
    }
}

fn skip_field(stream: &mut CodedInputStream, wire_type: u32) -> Result<()> {
    match wire_type {
        WIRE_VARINT => {
            stream.read_raw_varint64().map_err(decode_err)?;
        }
        WIRE_FIXED64 => {
            stream.read_fixed64().map_err(decode_err)?;
        }
        WIRE_LENGTH_DELIMITED => {
            let len = stream.read_raw_varint32().map_err(decode_err)?;
            stream.read_raw_bytes(len).map_err(decode_err)?;
        }
        WIRE_FIXED32 => {
            stream.read_fixed32().map_err(decode_err)?;
        }
        other => {
            return Err(ProtoError::Decode(format!(
                "Unsupported wire type {other} (groups are not supported)"
            )))
        }
    }
    Ok(())
}

fn decode_err(e: protobuf::Error) -> ProtoError {
    ProtoError::Decode(e.to_string())
}
