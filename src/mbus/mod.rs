//! The mbus module contains the components responsible for the core M-Bus
//! framing and transport layers: frame parsing and packing, the serial
//! transport, and a mock transport for tests.

pub mod frame;
pub mod serial;
pub mod serial_mock;

pub use frame::{decode_frame, pack_frame, parse_frame, verify_frame, MBusFrame, MBusFrameType};
pub use serial::{MBusDeviceHandle, MBusTransport, SerialConfig};
pub use serial_mock::MockTransport;
