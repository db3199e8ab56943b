//! Reversible text transform shared by the request decoder and response encoder
//!
//! Every attacker-influenced value crosses the wire as standard base64 of its
//! UTF-8 bytes, so the framing around it (form fields, JSON) never carries raw
//! page content. Structured values are serialized to JSON first and then
//! encoded like any other text.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as Base64Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::DecodeError;

/// Encode text for the wire
pub fn encode_text(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}

/// Decode a wire field back into text.
///
/// Spaces are read as `+`: the base64 alphabet has no space, and an unescaped
/// `+` inside a form body comes out of form decoding as one.
pub fn decode_text(field: &'static str, encoded: &str) -> Result<String, DecodeError> {
    let normalized: String = encoded
        .trim()
        .chars()
        .map(|c| if c == ' ' { '+' } else { c })
        .collect();

    let bytes = STANDARD
        .decode(normalized.as_bytes())
        .map_err(|e| DecodeError::InvalidEncoding {
            field,
            reason: e.to_string(),
        })?;

    String::from_utf8(bytes).map_err(|e| DecodeError::InvalidEncoding {
        field,
        reason: e.to_string(),
    })
}

/// Serialize a structured value to JSON and encode it
pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> String {
    // Maps with string keys and sequences of strings cannot fail to serialize.
    let json = serde_json::to_string(value).unwrap_or_else(|_| "null".to_string());
    encode_text(&json)
}

/// Decode a wire field and parse the JSON it carries
pub fn decode_json<T: DeserializeOwned>(field: &'static str, encoded: &str) -> Result<T, DecodeError> {
    let text = decode_text(field, encoded)?;
    serde_json::from_str(&text).map_err(|e| DecodeError::InvalidJson {
        field,
        reason: e.to_string(),
    })
}
