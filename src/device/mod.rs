//! The device module contains the slave-side protocol logic: the device's
//! identity and response payload, primary/secondary address resolution,
//! and the state machine driving responses on the bus.

pub mod address;
pub mod identity;
pub mod slave;

pub use address::{matches_primary, matches_secondary};
pub use identity::{DeviceIdentity, ResponsePayload, DEFAULT_RESPONSE};
pub use slave::{SlaveAction, SlaveDevice, SlaveState};
