//! Runtime protobuf support.
//!
//! Schemas arrive from the registry as `.proto` text, so there is no code
//! generation: the text is parsed with `protobuf-parse` into descriptors and
//! records are converted between JSON trees and protobuf binary by walking
//! those descriptors.

pub mod decoder;
pub mod encoder;
pub mod parser;

pub use decoder::ProtoDecoder;
pub use encoder::ProtoEncoder;
pub use parser::{ProtoFieldDescriptor, ProtoMessageDescriptor, ProtoSchema, ProtoType};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("Protobuf parse error: {0}")]
    Parse(String),

    #[error("Protobuf decode error: {0}")]
    Decode(String),

    #[error("Protobuf encode error: {0}")]
    Encode(String),

    #[error("Message type not found: {0}")]
    MessageTypeNotFound(String),
}

pub type Result<T> = std::result::Result<T, ProtoError>;
