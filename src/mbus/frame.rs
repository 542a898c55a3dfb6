//! # M-Bus Frame Codec
//!
//! This module decodes and encodes the wired M-Bus frame shapes defined by
//! EN 13757-2: the single byte acknowledgment, the short frame, and the
//! control/long frame. It leverages the `nom` crate for parsing the binary
//! layer and validates length, checksum and stop byte on the way in.
//!
//! ## Frame layouts
//!
//! ```text
//! ACK:     E5
//! Short:   10 C A CS 16                      CS = (C + A) mod 256
//! Control: 68 03 03 68 C A CI CS 16
//! Long:    68 L  L  68 C A CI data.. CS 16   L = 3 + data length
//! ```
//!
//! A control frame is a long frame whose length field is exactly 3 (no
//! user data). The checksum always covers the bytes from the control field
//! through the end of the data block.

use crate::constants::{
    MBUS_FRAME_ACK_START, MBUS_FRAME_LONG_START, MBUS_FRAME_SHORT_START, MBUS_FRAME_STOP,
};
use crate::error::{FrameParseError, MBusError};
use nom::bytes::complete::take;
use nom::number::complete::be_u8;
use nom::{Err as NomErr, IResult};

/// Result type of the nom-based frame parsers.
pub type FrameResult<'a, T> = IResult<&'a [u8], T, FrameParseError>;

/// Represents an M-Bus frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MBusFrame {
    pub frame_type: MBusFrameType,
    pub control: u8,
    pub address: u8,
    pub control_information: u8,
    pub data: Vec<u8>,
    pub checksum: u8,
}

/// Represents the different types of M-Bus frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MBusFrameType {
    Ack,
    Short,
    Control,
    Long,
}

impl MBusFrame {
    /// Builds the single byte acknowledgment frame.
    pub fn ack() -> Self {
        MBusFrame {
            frame_type: MBusFrameType::Ack,
            control: 0,
            address: 0,
            control_information: 0,
            data: Vec::new(),
            checksum: 0,
        }
    }

    /// Builds a short frame with the checksum filled in.
    pub fn short(control: u8, address: u8) -> Self {
        let mut frame = MBusFrame {
            frame_type: MBusFrameType::Short,
            control,
            address,
            control_information: 0,
            data: Vec::new(),
            checksum: 0,
        };
        frame.checksum = calculate_checksum(&frame);
        frame
    }

    /// Builds a control or long frame (depending on `data`) with the
    /// checksum filled in.
    pub fn long(control: u8, address: u8, control_information: u8, data: Vec<u8>) -> Self {
        let frame_type = if data.is_empty() {
            MBusFrameType::Control
        } else {
            MBusFrameType::Long
        };
        let mut frame = MBusFrame {
            frame_type,
            control,
            address,
            control_information,
            data,
            checksum: 0,
        };
        frame.checksum = calculate_checksum(&frame);
        frame
    }
}

/// Uses the `nom` crate to parse an M-Bus frame from a byte slice.
///
/// Structural defects (bad start/stop byte, disagreeing length bytes,
/// checksum mismatch) are raised as `nom::Err::Failure` carrying the
/// matching [`FrameParseError`] variant; a short buffer yields
/// [`FrameParseError::Truncated`].
pub fn parse_frame(input: &[u8]) -> FrameResult<MBusFrame> {
    let (input, start) = be_u8(input)?;
    match start {
        MBUS_FRAME_ACK_START => Ok((input, MBusFrame::ack())),
        MBUS_FRAME_SHORT_START => parse_short_frame(input),
        MBUS_FRAME_LONG_START => parse_control_or_long_frame(input),
        other => Err(NomErr::Failure(FrameParseError::BadStart(other))),
    }
}

/// Parses a short M-Bus frame after the start byte.
fn parse_short_frame(input: &[u8]) -> FrameResult<MBusFrame> {
    let (input, control) = be_u8(input)?;
    let (input, address) = be_u8(input)?;
    let (input, checksum) = be_u8(input)?;
    let (input, stop) = be_u8(input)?;
    if stop != MBUS_FRAME_STOP {
        return Err(NomErr::Failure(FrameParseError::BadStop(stop)));
    }

    let frame = MBusFrame {
        frame_type: MBusFrameType::Short,
        control,
        address,
        control_information: 0,
        data: Vec::new(),
        checksum,
    };
    let calculated = calculate_checksum(&frame);
    if checksum != calculated {
        return Err(NomErr::Failure(FrameParseError::BadChecksum {
            expected: checksum,
            calculated,
        }));
    }
    Ok((input, frame))
}

/// Parses a control or long M-Bus frame after the first start byte.
fn parse_control_or_long_frame(input: &[u8]) -> FrameResult<MBusFrame> {
    let (input, length1) = be_u8(input)?;
    let (input, length2) = be_u8(input)?;
    if length1 != length2 {
        return Err(NomErr::Failure(FrameParseError::LengthMismatch {
            length1,
            length2,
        }));
    }
    if length1 < 3 {
        // Length counts C, A and CI at minimum.
        return Err(NomErr::Failure(FrameParseError::LengthMismatch {
            length1,
            length2,
        }));
    }
    let (input, start2) = be_u8(input)?;
    if start2 != MBUS_FRAME_LONG_START {
        return Err(NomErr::Failure(FrameParseError::BadStart(start2)));
    }
    let (input, control) = be_u8(input)?;
    let (input, address) = be_u8(input)?;
    let (input, control_information) = be_u8(input)?;
    let (input, data) = take(length1 as usize - 3)(input)?;
    let (input, checksum) = be_u8(input)?;
    let (input, stop) = be_u8(input)?;
    if stop != MBUS_FRAME_STOP {
        return Err(NomErr::Failure(FrameParseError::BadStop(stop)));
    }

    let frame = MBusFrame {
        frame_type: if length1 == 3 {
            MBusFrameType::Control
        } else {
            MBusFrameType::Long
        },
        control,
        address,
        control_information,
        data: data.to_vec(),
        checksum,
    };
    let calculated = calculate_checksum(&frame);
    if checksum != calculated {
        return Err(NomErr::Failure(FrameParseError::BadChecksum {
            expected: checksum,
            calculated,
        }));
    }
    Ok((input, frame))
}

/// Decodes a single frame from a buffer starting at a frame boundary.
///
/// Convenience wrapper over [`parse_frame`] that flattens the nom error
/// plumbing into [`MBusError`]. Trailing bytes after the frame are left
/// alone; callers that require an exact fit should check the slice length
/// against [`frame_length`] first.
pub fn decode_frame(input: &[u8]) -> Result<MBusFrame, MBusError> {
    match parse_frame(input) {
        Ok((_rest, frame)) => Ok(frame),
        Err(NomErr::Error(e)) | Err(NomErr::Failure(e)) => Err(e.into()),
        Err(NomErr::Incomplete(_)) => Err(FrameParseError::Truncated.into()),
    }
}

/// Packs an M-Bus frame into a byte vector.
///
/// The checksum and stop byte are derived here, so the output is always a
/// well-formed frame regardless of the `checksum` field's value.
pub fn pack_frame(frame: &MBusFrame) -> Vec<u8> {
    let mut data = Vec::new();

    match frame.frame_type {
        MBusFrameType::Ack => {
            data.push(MBUS_FRAME_ACK_START);
        }
        MBusFrameType::Short => {
            data.push(MBUS_FRAME_SHORT_START);
            data.push(frame.control);
            data.push(frame.address);
            data.push(calculate_checksum(frame));
            data.push(MBUS_FRAME_STOP);
        }
        MBusFrameType::Control | MBusFrameType::Long => {
            pack_control_or_long_frame(&mut data, frame);
        }
    }

    data
}

/// Packs a control or long M-Bus frame into a byte vector.
fn pack_control_or_long_frame(data: &mut Vec<u8>, frame: &MBusFrame) {
    debug_assert!(frame.data.len() <= 252, "user data exceeds one telegram");
    let length = frame.data.len() as u8 + 3;
    data.push(MBUS_FRAME_LONG_START);
    data.push(length);
    data.push(length);
    data.push(MBUS_FRAME_LONG_START);
    data.push(frame.control);
    data.push(frame.address);
    data.push(frame.control_information);
    data.extend_from_slice(&frame.data);
    data.push(calculate_checksum(frame));
    data.push(MBUS_FRAME_STOP);
}

/// Verifies the stored checksum of a decoded M-Bus frame.
pub fn verify_frame(frame: &MBusFrame) -> Result<(), MBusError> {
    let calculated = calculate_checksum(frame);
    if frame.checksum != calculated {
        return Err(FrameParseError::BadChecksum {
            expected: frame.checksum,
            calculated,
        }
        .into());
    }
    Ok(())
}

/// Calculates the checksum of an M-Bus frame: the mod-256 sum of the bytes
/// from the control field through the end of the data block.
pub fn calculate_checksum(frame: &MBusFrame) -> u8 {
    let mut checksum: u8 = 0;
    match frame.frame_type {
        MBusFrameType::Ack => {}
        MBusFrameType::Short => {
            checksum = checksum.wrapping_add(frame.control);
            checksum = checksum.wrapping_add(frame.address);
        }
        MBusFrameType::Control | MBusFrameType::Long => {
            checksum = checksum.wrapping_add(frame.control);
            checksum = checksum.wrapping_add(frame.address);
            checksum = checksum.wrapping_add(frame.control_information);
            for byte in &frame.data {
                checksum = checksum.wrapping_add(*byte);
            }
        }
    }
    checksum
}

/// Total on-wire byte count of a frame, derived from its start and length
/// bytes. Used by the receive path to know how much to read.
pub fn frame_length(start: u8, length1: u8) -> usize {
    match start {
        MBUS_FRAME_ACK_START => 1,
        MBUS_FRAME_SHORT_START => 5,
        // 68 L L 68 .. CS 16
        MBUS_FRAME_LONG_START => 6 + length1 as usize,
        _ => 0,
    }
}
