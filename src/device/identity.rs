//! # Device Identity and Response Payload
//!
//! A slave's identity is not configured field by field; it is carried by
//! the preformatted RSP_UD telegram the device serves on every data
//! request. This module parses that telegram's variable data header into a
//! [`DeviceIdentity`] (used for secondary-address selection and logging)
//! and wraps the telegram itself as the [`ResponsePayload`] whose address
//! byte tracks primary-address reassignment.

use crate::constants::{MBUS_CONTROL_INFO_RESP_VARIABLE, MBUS_MAX_PRIMARY_SLAVES};
use crate::error::MBusError;
use crate::mbus::frame::{decode_frame, MBusFrame, MBusFrameType};

/// Built-in example identity: a water meter, variable data structure
/// (mode 1), identification number 12345678, manufacturer PAD.
pub const DEFAULT_RESPONSE: [u8; 37] = [
    0x68, 0x1F, 0x1F, 0x68, // header of RSP_UD telegram (length 1Fh)
    0x08, 0x02, 0x72, // C field = 08h (RSP_UD), address 2, CI field = 72h
    0x78, 0x56, 0x34, 0x12, // identification number = 12345678
    0x24, 0x40, 0x01, 0x07, // manufacturer 4024h (PAD), generation 1, water
    0x55, 0x00, 0x00, 0x00, // TC 55h, status 00h, signature 0000h
    0x03, 0x13, 0x15, 0x31, 0x00, // instantaneous volume, 12565 l (24 bit integer)
    0xDA, 0x02, 0x3B, 0x13, 0x01, // maximum volume flow, 113 l/h (4 digit BCD)
    0x8B, 0x60, 0x04, 0x37, 0x18, 0x02, // instantaneous energy, 218.37 kWh (6 digit BCD)
    0x18, 0x16, // checksum and stop byte
];

/// Fixed identity of this device, parsed from its response telegram.
///
/// Only `primary_address` ever changes after startup, and only through the
/// set-address command handled by the slave state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub primary_address: u8,
    /// Identification number, 8 BCD digits, least significant byte first.
    pub id_bcd: [u8; 4],
    pub manufacturer: u16,
    pub version: u8,
    pub medium: u8,
}

impl DeviceIdentity {
    /// Derives the identity from an RSP_UD telegram with a variable data
    /// structure header (CI 72h): 4-byte BCD id, 2-byte manufacturer,
    /// version, medium.
    pub fn from_response_frame(
        frame: &MBusFrame,
        primary_address: u8,
    ) -> Result<Self, MBusError> {
        if primary_address > MBUS_MAX_PRIMARY_SLAVES {
            return Err(MBusError::InvalidPrimaryAddress(primary_address));
        }
        if frame.frame_type != MBusFrameType::Long {
            return Err(MBusError::InvalidIdentity(
                "response telegram is not a long frame".into(),
            ));
        }
        if frame.control_information != MBUS_CONTROL_INFO_RESP_VARIABLE {
            return Err(MBusError::InvalidIdentity(format!(
                "unsupported CI 0x{:02X}, need variable data structure (0x72)",
                frame.control_information
            )));
        }
        if frame.data.len() < 8 {
            return Err(MBusError::InvalidIdentity(
                "variable data header shorter than 8 bytes".into(),
            ));
        }

        let mut id_bcd = [0u8; 4];
        id_bcd.copy_from_slice(&frame.data[0..4]);
        Ok(DeviceIdentity {
            primary_address,
            id_bcd,
            manufacturer: u16::from_le_bytes([frame.data[4], frame.data[5]]),
            version: frame.data[6],
            medium: frame.data[7],
        })
    }

    /// Identification number as its 8 decimal digits, most significant
    /// first.
    pub fn id_string(&self) -> String {
        let mut s = String::with_capacity(8);
        for byte in self.id_bcd.iter().rev() {
            s.push_str(&format!("{byte:02X}"));
        }
        s
    }

    /// Manufacturer id decoded to its three-letter EN 61107 code.
    pub fn manufacturer_code(&self) -> String {
        let m = self.manufacturer;
        let letters = [
            ((m >> 10) & 0x1F) as u8,
            ((m >> 5) & 0x1F) as u8,
            (m & 0x1F) as u8,
        ];
        letters
            .iter()
            .map(|l| {
                if (1..=26).contains(l) {
                    (l + b'A' - 1) as char
                } else {
                    '?'
                }
            })
            .collect()
    }

    /// Full 16-digit secondary address: id, manufacturer, version, medium.
    pub fn secondary_address_string(&self) -> String {
        format!(
            "{}{:04X}{:02X}{:02X}",
            self.id_string(),
            self.manufacturer,
            self.version,
            self.medium
        )
    }
}

/// The preformatted RSP_UD telegram served on every data request.
#[derive(Debug, Clone)]
pub struct ResponsePayload {
    frame: MBusFrame,
}

impl ResponsePayload {
    /// Decodes a telegram from raw bytes and stamps it with the device's
    /// primary address.
    pub fn from_bytes(bytes: &[u8], primary_address: u8) -> Result<Self, MBusError> {
        let mut frame = decode_frame(bytes)?;
        frame.address = primary_address;
        Ok(ResponsePayload { frame })
    }

    /// The built-in default telegram, stamped with the given address.
    pub fn default_response(primary_address: u8) -> Self {
        // The built-in telegram is well-formed by construction.
        Self::from_bytes(&DEFAULT_RESPONSE, primary_address)
            .expect("built-in response telegram is valid")
    }

    /// Rewrites the telegram's address byte after a primary-address
    /// reassignment. The checksum is recomputed when the frame is packed.
    pub fn set_primary_address(&mut self, address: u8) {
        self.frame.address = address;
    }

    pub fn frame(&self) -> &MBusFrame {
        &self.frame
    }
}
