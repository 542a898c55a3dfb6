//! # mbus-device - An M-Bus (Meter-Bus) Slave Device Emulator
//!
//! This crate emulates the slave (secondary station) side of the wired
//! M-Bus protocol (EN 13757-2/3): it listens on a half-duplex serial bus,
//! answers primary-station polling, takes part in primary-address
//! assignment and secondary-address selection, and serves a preconfigured
//! telemetry telegram on every data request.
//!
//! ## Features
//!
//! - Parse and pack the M-Bus frame shapes: ACK, short, control and long
//! - Primary addressing including the broadcast and network-layer addresses
//! - Secondary-address selection with nibble-wise wildcard masks
//! - Dynamic primary-address reassignment while selected
//! - Built-in example water-meter telegram, or a hex payload file override
//! - Transport seam so the protocol runs against real serial hardware or an
//!   in-memory mock
//!
//! ## Usage
//!
//! ```no_run
//! use mbus_device::device::{DeviceIdentity, ResponsePayload, SlaveDevice, SlaveState};
//! use mbus_device::mbus::MBusDeviceHandle;
//! use rand::SeedableRng;
//!
//! # async fn demo() -> Result<(), mbus_device::MBusError> {
//! let payload = ResponsePayload::default_response(5);
//! let identity = DeviceIdentity::from_response_frame(payload.frame(), 5)?;
//! let transport = MBusDeviceHandle::connect("/dev/ttyUSB0").await?;
//! let rng = rand::rngs::StdRng::from_entropy();
//! let mut device = SlaveDevice::new(SlaveState::new(identity, payload), transport, rng);
//! let (_tx, shutdown) = tokio::sync::watch::channel(false);
//! device.run(shutdown).await;
//! # Ok(())
//! # }
//! ```

pub mod constants;
pub mod device;
pub mod error;
pub mod logging;
pub mod mbus;
pub mod util;

pub use crate::error::{FrameParseError, MBusError};
pub use crate::logging::init_logger;

// Core M-Bus types
pub use device::{DeviceIdentity, ResponsePayload, SlaveAction, SlaveDevice, SlaveState};
pub use mbus::serial::{MBusDeviceHandle, MBusTransport, SerialConfig};
pub use mbus::{MBusFrame, MBusFrameType};
