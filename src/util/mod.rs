//! # Utility Modules
//!
//! Common helpers used throughout the crate.

pub mod hex;

pub use hex::{decode_hex, encode_hex, HexError};
