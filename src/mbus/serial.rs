//! # M-Bus Serial Transport
//!
//! This module provides the serial transport for the slave side of the
//! M-Bus protocol: opening the port, sending packed frames, and the
//! frame-boundary-aware receive path the device loop blocks on.
//!
//! A slave spends most of its life waiting for the master to speak, so
//! [`MBusDeviceHandle::recv_frame`] waits indefinitely for a start byte and
//! only applies an inter-byte timeout once a frame has begun; a telegram
//! that stalls mid-frame is dropped and the wait starts over at the next
//! frame boundary.

use crate::constants::{
    MBUS_FRAME_ACK_START, MBUS_FRAME_LONG_START, MBUS_FRAME_SHORT_START,
};
use crate::error::{FrameParseError, MBusError};
use crate::mbus::frame::{decode_frame, frame_length, pack_frame, MBusFrame};
use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPort, SerialPortBuilderExt};

/// Byte-level transport seam between the slave state machine and the bus.
///
/// Implemented by [`MBusDeviceHandle`] for real hardware and by the mock in
/// [`serial_mock`](crate::mbus::serial_mock) for tests.
#[async_trait]
pub trait MBusTransport: Send {
    /// Packs and transmits one frame.
    async fn send_frame(&mut self, frame: &MBusFrame) -> Result<(), MBusError>;

    /// Blocks until one full frame has been received and decoded.
    async fn recv_frame(&mut self) -> Result<MBusFrame, MBusError>;
}

/// Configuration for the serial connection.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub baudrate: u32,
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            baudrate: 2400,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Handle to the M-Bus serial connection, encapsulating the
/// tokio_serial::SerialStream.
pub struct MBusDeviceHandle {
    port: tokio_serial::SerialStream,
    config: SerialConfig,
}

impl MBusDeviceHandle {
    /// Opens the serial port with default settings (2400 baud, 8E1).
    pub async fn connect(port_name: &str) -> Result<MBusDeviceHandle, MBusError> {
        Self::connect_with_config(port_name, SerialConfig::default()).await
    }

    /// Opens the serial port with the given configuration. M-Bus uses
    /// 8 data bits, even parity, 1 stop bit at every baud rate.
    pub async fn connect_with_config(
        port_name: &str,
        config: SerialConfig,
    ) -> Result<MBusDeviceHandle, MBusError> {
        let port = tokio_serial::new(port_name, config.baudrate)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(tokio_serial::Parity::Even)
            .timeout(config.timeout)
            .open_native_async()
            .map_err(|e| MBusError::SerialPortError(e.to_string()))?;

        Ok(MBusDeviceHandle { port, config })
    }

    /// Changes the baud rate on the open port.
    pub fn set_baud_rate(&mut self, baudrate: u32) -> Result<(), MBusError> {
        self.port
            .set_baud_rate(baudrate)
            .map_err(|e| MBusError::SerialPortError(e.to_string()))?;
        self.config.baudrate = baudrate;
        Ok(())
    }

    /// Closes the serial port connection. SerialStream has no close method;
    /// dropping the handle closes it.
    pub async fn disconnect(&mut self) -> Result<(), MBusError> {
        Ok(())
    }

    /// Inter-byte timeout once a frame has started, derived from the baud
    /// rate (coarse, matching common M-Bus master defaults).
    fn interbyte_timeout(&self) -> Duration {
        match self.config.baudrate {
            300 => Duration::from_millis(1300),
            600 => Duration::from_millis(800),
            1200 => Duration::from_millis(500),
            2400 => Duration::from_millis(300),
            4800 => Duration::from_millis(300),
            9600 => Duration::from_millis(200),
            19200 => Duration::from_millis(200),
            38400 => Duration::from_millis(200),
            _ => Duration::from_millis(500),
        }
    }

    /// Reads exactly `len` bytes under the inter-byte timeout.
    async fn read_exact_timed(&mut self, len: usize) -> Result<Vec<u8>, MBusError> {
        let mut buf = vec![0u8; len];
        tokio::time::timeout(self.interbyte_timeout(), self.port.read_exact(&mut buf))
            .await
            .map_err(|_| MBusError::SerialPortError("inter-byte timeout".into()))
            .and_then(|res| {
                res.map_err(|e| MBusError::SerialPortError(e.to_string()))?;
                Ok(buf)
            })
    }
}

#[async_trait]
impl MBusTransport for MBusDeviceHandle {
    async fn send_frame(&mut self, frame: &MBusFrame) -> Result<(), MBusError> {
        let data = pack_frame(frame);
        self.port
            .write_all(&data)
            .await
            .map_err(|e| MBusError::SerialPortError(e.to_string()))?;
        self.port
            .flush()
            .await
            .map_err(|e| MBusError::SerialPortError(e.to_string()))
    }

    async fn recv_frame(&mut self) -> Result<MBusFrame, MBusError> {
        // Wait for a start byte without a deadline; the master may stay
        // silent for hours.
        let mut start = [0u8; 1];
        let n = self
            .port
            .read(&mut start)
            .await
            .map_err(|e| MBusError::SerialPortError(e.to_string()))?;
        if n == 0 {
            return Err(MBusError::SerialPortError("port closed".into()));
        }

        let mut buf = BytesMut::with_capacity(260);
        buf.put_u8(start[0]);

        let total_len = match start[0] {
            MBUS_FRAME_ACK_START => 1,
            MBUS_FRAME_SHORT_START => frame_length(start[0], 0),
            MBUS_FRAME_LONG_START => {
                let lens = self.read_exact_timed(2).await?;
                buf.put_slice(&lens);
                if lens[0] != lens[1] {
                    return Err(FrameParseError::LengthMismatch {
                        length1: lens[0],
                        length2: lens[1],
                    }
                    .into());
                }
                frame_length(start[0], lens[0])
            }
            other => return Err(FrameParseError::BadStart(other).into()),
        };

        if buf.len() < total_len {
            let rest = self.read_exact_timed(total_len - buf.len()).await?;
            buf.put_slice(&rest);
        }

        decode_frame(&buf)
    }
}
