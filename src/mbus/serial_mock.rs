//! Mock transport implementation for testing
//!
//! This module provides a mock bus transport that can be used to test the
//! slave protocol logic without requiring actual hardware. Frames are
//! queued as raw bytes so the codec path is exercised exactly as it is on
//! a real port.

use crate::error::{FrameParseError, MBusError};
use crate::mbus::frame::{decode_frame, frame_length, pack_frame, MBusFrame};
use crate::mbus::serial::MBusTransport;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Mock bus that simulates the master side of a half-duplex link.
#[derive(Clone, Default)]
pub struct MockTransport {
    /// Raw bytes the slave has transmitted (outgoing).
    tx_buffer: Arc<Mutex<Vec<u8>>>,
    /// Raw bytes waiting to be received by the slave (incoming).
    rx_buffer: Arc<Mutex<VecDeque<u8>>>,
    /// Error to surface on the next send or receive.
    next_error: Arc<Mutex<Option<MBusError>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue raw bytes for the slave to receive.
    pub fn queue_rx_data(&self, data: &[u8]) {
        let mut rx = self.rx_buffer.lock().unwrap();
        rx.extend(data);
    }

    /// Queue a frame for the slave to receive, packed to wire bytes.
    pub fn queue_rx_frame(&self, frame: &MBusFrame) {
        self.queue_rx_data(&pack_frame(frame));
    }

    /// Raw bytes the slave has written so far.
    pub fn tx_data(&self) -> Vec<u8> {
        self.tx_buffer.lock().unwrap().clone()
    }

    /// Decodes the slave's transmissions into frames, in order.
    pub fn tx_frames(&self) -> Vec<MBusFrame> {
        let data = self.tx_data();
        let mut frames = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            let len1 = if data[offset] == 0x68 {
                *data.get(offset + 1).unwrap_or(&0)
            } else {
                0
            };
            let total = frame_length(data[offset], len1).max(1);
            if let Ok(frame) = decode_frame(&data[offset..]) {
                frames.push(frame);
            }
            offset += total;
        }
        frames
    }

    /// Clear all buffers.
    pub fn clear(&self) {
        self.tx_buffer.lock().unwrap().clear();
        self.rx_buffer.lock().unwrap().clear();
    }

    /// Surface an error on the next transport operation.
    pub fn set_next_error(&self, error: MBusError) {
        *self.next_error.lock().unwrap() = Some(error);
    }

    /// True when no queued bytes remain unread.
    pub fn rx_exhausted(&self) -> bool {
        self.rx_buffer.lock().unwrap().is_empty()
    }

    fn take_error(&self) -> Option<MBusError> {
        self.next_error.lock().unwrap().take()
    }
}

#[async_trait]
impl MBusTransport for MockTransport {
    async fn send_frame(&mut self, frame: &MBusFrame) -> Result<(), MBusError> {
        if let Some(err) = self.take_error() {
            return Err(err);
        }
        let mut tx = self.tx_buffer.lock().unwrap();
        tx.extend_from_slice(&pack_frame(frame));
        Ok(())
    }

    async fn recv_frame(&mut self) -> Result<MBusFrame, MBusError> {
        if let Some(err) = self.take_error() {
            return Err(err);
        }

        let mut rx = self.rx_buffer.lock().unwrap();
        let first = *rx
            .front()
            .ok_or_else(|| MBusError::SerialPortError("rx queue empty".into()))?;
        let total = match first {
            0xE5 => 1,
            0x10 => 5,
            0x68 => {
                let len1 = *rx
                    .get(1)
                    .ok_or(MBusError::FrameParseError(FrameParseError::Truncated))?;
                frame_length(first, len1)
            }
            other => {
                rx.pop_front();
                return Err(FrameParseError::BadStart(other).into());
            }
        };
        if rx.len() < total {
            rx.clear();
            return Err(FrameParseError::Truncated.into());
        }
        let bytes: Vec<u8> = rx.drain(..total).collect();
        drop(rx);
        decode_frame(&bytes)
    }
}
