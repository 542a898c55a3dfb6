//! M-Bus Protocol Constants
//!
//! This module defines constants used in the M-Bus protocol implementation,
//! based on the EN 13757 standard (values aligned with libmbus).

// ----------------------------------------------------------------------------
// Frame delimiters
// ----------------------------------------------------------------------------

/// Start byte of an ACK frame (the whole frame).
pub const MBUS_FRAME_ACK_START: u8 = 0xE5;

/// Start byte of a short frame.
pub const MBUS_FRAME_SHORT_START: u8 = 0x10;

/// Start byte of a control or long frame (appears twice in the header).
pub const MBUS_FRAME_LONG_START: u8 = 0x68;

/// Stop byte terminating short, control and long frames.
pub const MBUS_FRAME_STOP: u8 = 0x16;

// ----------------------------------------------------------------------------
// Reserved addresses (EN 13757-2)
// ----------------------------------------------------------------------------

/// Highest assignable primary address; 251..=255 are reserved.
pub const MBUS_MAX_PRIMARY_SLAVES: u8 = 250;

/// Network layer (secondary addressing) address.
pub const MBUS_ADDRESS_NETWORK_LAYER: u8 = 0xFD;

/// Broadcast address to which all slaves reply.
pub const MBUS_ADDRESS_BROADCAST_REPLY: u8 = 0xFE;

/// Broadcast address to which no slave replies.
pub const MBUS_ADDRESS_BROADCAST_NOREPLY: u8 = 0xFF;

// ----------------------------------------------------------------------------
// Control field (full control bytes for common commands)
// ----------------------------------------------------------------------------

pub const MBUS_CONTROL_MASK_SND_NKE: u8 = 0x40;
pub const MBUS_CONTROL_MASK_SND_UD: u8 = 0x53; // includes DIR M2S
pub const MBUS_CONTROL_MASK_REQ_UD2: u8 = 0x5B; // includes DIR M2S
pub const MBUS_CONTROL_MASK_REQ_UD1: u8 = 0x5A; // includes DIR M2S
pub const MBUS_CONTROL_MASK_RSP_UD: u8 = 0x08; // S2M response

// Control flag bits
pub const MBUS_CONTROL_MASK_FCB: u8 = 0x20;
pub const MBUS_CONTROL_MASK_FCV: u8 = 0x10;
pub const MBUS_CONTROL_MASK_DIR_M2S: u8 = 0x40;
pub const MBUS_CONTROL_MASK_DIR_S2M: u8 = 0x00;

// ----------------------------------------------------------------------------
// Control information (CI) codes
// ----------------------------------------------------------------------------

pub const MBUS_CONTROL_INFO_DATA_SEND: u8 = 0x51;
pub const MBUS_CONTROL_INFO_SELECT_SLAVE: u8 = 0x52;
pub const MBUS_CONTROL_INFO_RESP_VARIABLE: u8 = 0x72;
pub const MBUS_CONTROL_INFO_RESP_FIXED: u8 = 0x73;

/// Leading data bytes of the "set primary address" command carried in a
/// SND_UD/DATA_SEND telegram: DIF 0x01 (8 bit integer), VIF 0x7A (bus
/// address), followed by the new address byte.
pub const MBUS_DATA_SET_ADDRESS: [u8; 2] = [0x01, 0x7A];

/// Length of the selection data block in a SELECT_SLAVE telegram:
/// 4-byte BCD identification number, 2-byte manufacturer, version, medium.
pub const MBUS_SELECTION_DATA_LENGTH: usize = 8;
