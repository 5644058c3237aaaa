//! Schema registry wire envelope.
//!
//! Format: `[magic_byte(1)][schema_id(4, big-endian)][payload(N)]`

use crate::{CodecError, Result};
use bytes::{Buf, BufMut};

/// Magic byte indicating a schema id is present
pub const MAGIC_BYTE: u8 = 0x00;

/// Length of the envelope header.
pub const HEADER_LEN: usize = 5;

/// Prefix `payload` with the magic byte and schema id.
pub fn encode(schema_id: i32, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.put_u8(MAGIC_BYTE);
    buf.put_i32(schema_id);
    buf.put_slice(payload);
    buf
}

/// Split an enveloped record into its schema id and payload.
pub fn decode(data: &[u8]) -> Result<(i32, &[u8])> {
    if data.len() < HEADER_LEN {
        return Err(CodecError::Envelope(format!(
            "Data too short to contain schema ID: {} bytes",
            data.len()
        )));
    }

    if data[0] != MAGIC_BYTE {
        return Err(CodecError::Envelope(format!(
            "Unknown magic byte: expected 0x00, got 0x{:02x}",
            data[0]
        )));
    }

    let mut id_bytes = &data[1..HEADER_LEN];
    let schema_id = id_bytes.get_i32();

    Ok((schema_id, &data[HEADER_LEN..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let framed = encode(258, b"abc");
        assert_eq!(framed, vec![0x00, 0x00, 0x00, 0x01, 0x02, b'a', b'b', b'c']);

        let (id, payload) = decode(&framed).unwrap();
        assert_eq!(id, 258);
        assert_eq!(payload, b"abc");
    }

    #[test]
    fn test_empty_payload_is_valid() {
        let framed = encode(7, &[]);
        let (id, payload) = decode(&framed).unwrap();
        assert_eq!(id, 7);
        assert!(payload.is_empty());
    }

    #[test]
    fn test_decode_invalid_magic_byte() {
        let data = vec![0x01, 0x00, 0x00, 0x00, 0x01, 0x42];
        assert!(matches!(decode(&data), Err(CodecError::Envelope(_))));
    }

    #[test]
    fn test_decode_too_short() {
        assert!(decode(&[0x00, 0x00, 0x00, 0x01]).is_err());
        assert!(decode(&[]).is_err());
    }
}
