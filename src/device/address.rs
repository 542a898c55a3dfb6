//! # Address Resolver
//!
//! Decides whether an inbound request is meant for this device, either by
//! primary address (including the reserved broadcast and network-layer
//! addresses) or by a masked secondary-address selection pattern.

use crate::constants::{
    MBUS_ADDRESS_BROADCAST_REPLY, MBUS_ADDRESS_NETWORK_LAYER, MBUS_SELECTION_DATA_LENGTH,
};
use crate::error::MBusError;

/// True when a request addressed to `frame_address` is directed at a device
/// with primary address `primary`. The broadcast-with-reply and
/// network-layer addresses match every device.
pub fn matches_primary(frame_address: u8, primary: u8) -> bool {
    frame_address == primary
        || frame_address == MBUS_ADDRESS_BROADCAST_REPLY
        || frame_address == MBUS_ADDRESS_NETWORK_LAYER
}

/// Nibble-wise wildcard compare of a SELECT_SLAVE data block against this
/// device's 4-byte BCD identification number.
///
/// The selection block must be exactly 8 bytes (id, manufacturer, version,
/// medium); its first 4 bytes are the id mask. Both mask and id are BCD
/// with the least significant byte first; digits are walked most
/// significant nibble first. A mask nibble of 0xF matches any digit; every
/// non-wildcard nibble must equal the device digit (EN 13757-3).
pub fn matches_secondary(data: &[u8], id_bcd: &[u8; 4]) -> Result<bool, MBusError> {
    if data.len() != MBUS_SELECTION_DATA_LENGTH {
        return Err(MBusError::InvalidSelectionLength(data.len()));
    }

    for i in 0..4 {
        // Byte 3 holds the most significant digits.
        let mask = data[3 - i];
        let id = id_bcd[3 - i];
        for shift in [4u8, 0u8] {
            let m = (mask >> shift) & 0x0F;
            let d = (id >> shift) & 0x0F;
            if m == 0x0F {
                continue;
            }
            if m != d {
                return Ok(false);
            }
        }
    }
    Ok(true)
}
