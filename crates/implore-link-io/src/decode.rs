//! Variable buffer decoding
//!
//! Buffers arrive either as `base64:`-prefixed little-endian `f32` bytes or
//! as plain numeric arrays.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix marking a base64-encoded `f32` payload
pub const BASE64_PREFIX: &str = "base64:";

/// Errors that can occur while decoding a dataset payload
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Buffer is missing the 'base64:' prefix")]
    MissingPrefix,

    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Payload of {len} bytes is not a whole number of f32 values")]
    Misaligned { len: usize },

    #[error("Buffer for '{variable}' could not be decoded: {source}")]
    Variable {
        variable: String,
        #[source]
        source: Box<DecodeError>,
    },

    #[error("Invalid descriptor: {0}")]
    Json(#[from] serde_json::Error),
}

impl DecodeError {
    /// Attach the variable name to a decode failure
    pub fn for_variable(self, variable: impl Into<String>) -> Self {
        DecodeError::Variable {
            variable: variable.into(),
            source: Box::new(self),
        }
    }
}

/// Result type for decode operations
pub type DecodeResult<T> = Result<T, DecodeError>;

/// A variable buffer as shipped by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EncodedBuffer {
    /// `"base64:..."` little-endian `f32` bytes
    Encoded(String),

    /// Plain numeric array
    Values(Vec<f32>),
}

impl EncodedBuffer {
    /// Encode values as a `base64:` payload
    pub fn encode(values: &[f32]) -> Self {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        EncodedBuffer::Encoded(format!("{}{}", BASE64_PREFIX, STANDARD.encode(bytes)))
    }

    /// Decode into `f32` values
    pub fn decode(&self) -> DecodeResult<Vec<f32>> {
        match self {
            EncodedBuffer::Encoded(text) => decode_base64_f32(text),
            EncodedBuffer::Values(values) => Ok(values.clone()),
        }
    }

    /// Decode and truncate to at most `n_points` values
    pub fn decode_truncated(&self, n_points: usize) -> DecodeResult<Vec<f32>> {
        let mut values = self.decode()?;
        values.truncate(n_points);
        Ok(values)
    }
}

impl From<Vec<f32>> for EncodedBuffer {
    fn from(values: Vec<f32>) -> Self {
        EncodedBuffer::Values(values)
    }
}

/// Decode a `base64:`-prefixed string of little-endian `f32` bytes
pub fn decode_base64_f32(text: &str) -> DecodeResult<Vec<f32>> {
    let payload = text
        .strip_prefix(BASE64_PREFIX)
        .ok_or(DecodeError::MissingPrefix)?;
    let bytes = STANDARD.decode(payload.trim())?;

    if bytes.len() % 4 != 0 {
        return Err(DecodeError::Misaligned { len: bytes.len() });
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_known_payload() {
        // 1.0f32 and -2.5f32, little-endian
        let bytes: Vec<u8> = [1.0f32, -2.5f32]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let text = format!("base64:{}", STANDARD.encode(bytes));

        let values = decode_base64_f32(&text).unwrap();
        assert_eq!(values, vec![1.0, -2.5]);
    }

    #[test]
    fn test_encode_matches_decode() {
        let values = vec![0.0, 0.25, 1e6, -3.0];
        let buffer = EncodedBuffer::encode(&values);
        assert!(matches!(&buffer, EncodedBuffer::Encoded(s) if s.starts_with(BASE64_PREFIX)));
        assert_eq!(buffer.decode().unwrap(), values);
    }

    #[test]
    fn test_missing_prefix() {
        let err = decode_base64_f32("AAAAAA==").unwrap_err();
        assert!(matches!(err, DecodeError::MissingPrefix));
    }

    #[test]
    fn test_misaligned_payload() {
        let text = format!("base64:{}", STANDARD.encode([1u8, 2, 3]));
        let err = decode_base64_f32(&text).unwrap_err();
        assert!(matches!(err, DecodeError::Misaligned { len: 3 }));
    }

    #[test]
    fn test_invalid_base64() {
        let err = decode_base64_f32("base64:!!not-base64!!").unwrap_err();
        assert!(matches!(err, DecodeError::Base64(_)));
    }

    #[test]
    fn test_truncation() {
        let buffer = EncodedBuffer::Values(vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(buffer.decode_truncated(2).unwrap(), vec![1.0, 2.0]);
        assert_eq!(buffer.decode_truncated(10).unwrap().len(), 4);
    }

    #[test]
    fn test_untagged_deserialization() {
        let values: EncodedBuffer = serde_json::from_str("[1.0, 2.0]").unwrap();
        assert_eq!(values, EncodedBuffer::Values(vec![1.0, 2.0]));

        let encoded: EncodedBuffer = serde_json::from_str("\"base64:AACAPw==\"").unwrap();
        assert_eq!(encoded.decode().unwrap(), vec![1.0]);
    }

    #[test]
    fn test_variable_context_in_message() {
        let err = DecodeError::MissingPrefix.for_variable("qc");
        assert!(err.to_string().contains("qc"));
    }
}
