//! # M-Bus Error Handling
//!
//! This module defines the MBusError enum, which represents the different
//! error types that can occur in the mbus-device crate, and the
//! FrameParseError taxonomy used by the frame codec.

use thiserror::Error;

/// Represents the different error types that can occur in the crate.
#[derive(Debug, Error)]
pub enum MBusError {
    /// Indicates an error related to the serial port communication.
    #[error("Serial port error: {0}")]
    SerialPortError(String),

    /// Indicates an error when parsing an M-Bus frame.
    #[error("Error parsing M-Bus frame: {0}")]
    FrameParseError(#[from] FrameParseError),

    /// Indicates a SELECT_SLAVE telegram whose data block is not the
    /// expected 8 bytes.
    #[error("Invalid selection data length: {0} bytes, expected 8")]
    InvalidSelectionLength(usize),

    /// Indicates an invalid hexadecimal string was provided.
    #[error("Invalid hexadecimal string")]
    InvalidHexString,

    /// Indicates the configured response telegram does not carry a
    /// variable data structure header to derive the device identity from.
    #[error("Cannot derive device identity: {0}")]
    InvalidIdentity(String),

    /// Indicates a primary address outside the assignable 0..=250 range.
    #[error("Invalid primary address: {0}")]
    InvalidPrimaryAddress(u8),

    /// A catch-all error for uncategorized cases.
    #[error("Other error: {0}")]
    Other(String),
}

/// Ways a byte buffer can fail to decode as an M-Bus frame.
///
/// This type doubles as the custom `nom` error for [`parse_frame`]; the
/// structural variants are raised as `nom::Err::Failure` so callers can
/// tell a malformed frame from one that merely needs more bytes.
///
/// [`parse_frame`]: crate::mbus::frame::parse_frame
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameParseError {
    /// Fewer bytes available than the frame declares.
    #[error("Truncated frame")]
    Truncated,

    /// Lead byte is not one of 0xE5, 0x10, 0x68.
    #[error("Invalid start byte: 0x{0:02X}")]
    BadStart(u8),

    /// The two length bytes of a control/long frame disagree.
    #[error("Length bytes disagree: {length1} != {length2}")]
    LengthMismatch { length1: u8, length2: u8 },

    /// Checksum byte does not match the mod-256 sum of the frame body.
    #[error("Invalid checksum: expected {expected}, calculated {calculated}")]
    BadChecksum { expected: u8, calculated: u8 },

    /// Terminal byte is not the stop byte 0x16.
    #[error("Invalid stop byte: 0x{0:02X}")]
    BadStop(u8),

    /// An uncategorized nom parsing error.
    #[error("Nom error: {0:?}")]
    Nom(nom::error::ErrorKind),
}

impl<'a> nom::error::ParseError<&'a [u8]> for FrameParseError {
    fn from_error_kind(_input: &'a [u8], kind: nom::error::ErrorKind) -> Self {
        // nom reports Eof for take/be_u8 on a short buffer
        if kind == nom::error::ErrorKind::Eof {
            FrameParseError::Truncated
        } else {
            FrameParseError::Nom(kind)
        }
    }

    fn append(_input: &'a [u8], _kind: nom::error::ErrorKind, other: Self) -> Self {
        other
    }
}
