//! # Hex Encoding/Decoding Utilities
//!
//! Thin helpers over the `hex` crate used for loading payload override
//! files and for dumping frames in debug output. Payload files may contain
//! whitespace and line breaks between hex digits.

use thiserror::Error;

/// Errors that can occur during hex operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HexError {
    #[error("Odd number of hex characters: {0}")]
    OddLength(usize),

    #[error("Empty hex string")]
    EmptyString,

    #[error("Hex decoding error: {0}")]
    DecodeError(String),
}

/// Encode bytes to a lowercase hex string.
pub fn encode_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Decode a hex string to bytes, ignoring any whitespace.
pub fn decode_hex(input: &str) -> Result<Vec<u8>, HexError> {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(HexError::EmptyString);
    }
    if cleaned.len() % 2 != 0 {
        return Err(HexError::OddLength(cleaned.len()));
    }
    hex::decode(&cleaned).map_err(|e| HexError::DecodeError(e.to_string()))
}
