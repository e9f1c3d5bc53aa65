//! Byte codec
//!
//! Projects raw attribute payloads into the shapes the host understands and
//! turns host supplied values back into bytes.

use crate::domain::models::ReadOptions;
use crate::error::{BridgeError, Result};
use serde::Serialize;
use serde_json::Value;

/// Structured projection of a binary payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DecodedValue {
    /// One element per byte, 0..=255
    Unsigned(Vec<u8>),
    /// One element per byte, -128..=127
    Signed(Vec<i8>),
    /// Text decoded from `offset` onwards
    Text(String),
}

/// Decode `bytes` according to `options`
pub fn decode(bytes: &[u8], options: &ReadOptions) -> DecodedValue {
    if options.as_string {
        let tail = bytes.get(options.offset..).unwrap_or_default();
        return DecodedValue::Text(String::from_utf8_lossy(tail).into_owned());
    }

    if options.value_unsigned {
        DecodedValue::Unsigned(bytes.to_vec())
    } else {
        DecodedValue::Signed(bytes.iter().map(|&b| b as i8).collect())
    }
}

/// Inverse of unsigned decoding. Each element is wrapped to a single byte.
pub fn encode(values: &[i64]) -> Vec<u8> {
    values.iter().map(|&v| v as u8).collect()
}

/// Encode a host supplied value: an array of integers or a string
pub fn encode_json(value: &Value) -> Result<Vec<u8>> {
    match value {
        Value::String(text) => Ok(text.as_bytes().to_vec()),
        Value::Array(items) => {
            let mut ints = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let int = item
                    .as_i64()
                    .or_else(|| item.as_u64().map(|u| u as i64))
                    .ok_or_else(|| {
                        BridgeError::ValueEncodingFailed(format!(
                            "element {} is not an integer: {}",
                            index, item
                        ))
                    })?;
                ints.push(int);
            }
            Ok(encode(&ints))
        }
        other => Err(BridgeError::ValueEncodingFailed(format!(
            "expected an integer array or a string, got {}",
            other
        ))),
    }
}
