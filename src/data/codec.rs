//! Payload codec
//!
//! Records are stored as compact JSON blobs. Key order is preserved,
//! so a record decodes to exactly the mapping that was encoded.

use super::models::Record;
use crate::error::{DecodeError, EncodeError};

/// JSON codec for status payloads
#[derive(Debug, Clone)]
pub struct JsonCodec {
    max_payload_bytes: usize,
}

impl JsonCodec {
    /// Create a codec rejecting payloads larger than `max_payload_bytes`
    pub fn new(max_payload_bytes: usize) -> Self {
        Self { max_payload_bytes }
    }

    /// Serialize a record into a payload blob
    pub fn encode(&self, record: &Record) -> Result<Vec<u8>, EncodeError> {
        let bytes = serde_json::to_vec(record).map_err(EncodeError::Json)?;
        if bytes.len() > self.max_payload_bytes {
            return Err(EncodeError::TooLarge {
                size: bytes.len(),
                limit: self.max_payload_bytes,
            });
        }
        Ok(bytes)
    }

    /// Deserialize a payload blob into a record
    pub fn decode(&self, bytes: &[u8]) -> Result<Record, DecodeError> {
        match serde_json::from_slice(bytes).map_err(DecodeError::Json)? {
            serde_json::Value::Object(record) => Ok(record),
            _ => Err(DecodeError::NotAnObject),
        }
    }
}
