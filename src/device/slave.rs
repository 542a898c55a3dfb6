//! # Slave State Machine
//!
//! The protocol core of the device emulator. [`SlaveState::step`] is a pure
//! transition function from one decoded request to the action the device
//! takes on the bus, so the whole protocol can be tested without a
//! transport; [`SlaveDevice`] wraps it in the receive-then-react loop that
//! runs against a real or mock [`MBusTransport`].
//!
//! A slave is either idle or selected. Selection is entered by a
//! SELECT_SLAVE telegram whose mask matches our identification number and
//! left again on a non-matching mask or a network-layer SND_NKE
//! (EN 13757-3, ch 7.1). While selected the device also answers polls that
//! its primary address alone would not claim, and accepts the
//! primary-address reassignment command.

use crate::constants::{
    MBUS_ADDRESS_BROADCAST_NOREPLY, MBUS_ADDRESS_BROADCAST_REPLY, MBUS_ADDRESS_NETWORK_LAYER,
    MBUS_CONTROL_INFO_DATA_SEND, MBUS_CONTROL_INFO_SELECT_SLAVE, MBUS_CONTROL_MASK_FCB,
    MBUS_CONTROL_MASK_REQ_UD2, MBUS_CONTROL_MASK_SND_NKE, MBUS_CONTROL_MASK_SND_UD,
    MBUS_DATA_SET_ADDRESS, MBUS_MAX_PRIMARY_SLAVES,
};
use crate::device::address::{matches_secondary, matches_primary};
use crate::device::identity::{DeviceIdentity, ResponsePayload};
use crate::error::MBusError;
use crate::mbus::frame::{MBusFrame, MBusFrameType};
use crate::mbus::serial::MBusTransport;
use log::{debug, info, warn};
use rand::Rng;
use std::time::Duration;
use tokio::sync::watch;

/// What the device does in reaction to one inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlaveAction {
    /// No transmission.
    Ignore,
    /// Transmit the single byte ACK, after collision-avoidance jitter.
    SendAck,
    /// Transmit a full response telegram.
    SendResponse(MBusFrame),
}

/// Mutable protocol state of the emulated slave.
#[derive(Debug, Clone)]
pub struct SlaveState {
    identity: DeviceIdentity,
    response: ResponsePayload,
    selected: bool,
}

impl SlaveState {
    pub fn new(identity: DeviceIdentity, response: ResponsePayload) -> Self {
        SlaveState {
            identity,
            response,
            selected: false,
        }
    }

    pub fn primary_address(&self) -> u8 {
        self.identity.primary_address
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    /// Advances the state machine by one inbound request and returns the
    /// transmission to perform, if any.
    pub fn step(&mut self, request: &MBusFrame) -> SlaveAction {
        if request.frame_type == MBusFrameType::Ack {
            // Another slave's ACK echoing on the half-duplex bus.
            return SlaveAction::Ignore;
        }

        let for_us = match request.address {
            MBUS_ADDRESS_BROADCAST_NOREPLY => return SlaveAction::Ignore,
            MBUS_ADDRESS_BROADCAST_REPLY | MBUS_ADDRESS_NETWORK_LAYER => true,
            addr if matches_primary(addr, self.identity.primary_address) => true,
            addr => {
                debug!(
                    "Not for us ({}), got addr {} control 0x{:02X}",
                    self.identity.primary_address, addr, request.control
                );
                return SlaveAction::Ignore;
            }
        };

        // FCB is advisory here: observed and stripped, not used to detect
        // retransmissions.
        let fcb = request.control & MBUS_CONTROL_MASK_FCB != 0;
        let control = request.control & !MBUS_CONTROL_MASK_FCB;
        if fcb {
            debug!("FCB set on control 0x{control:02X}");
        }

        match control {
            MBUS_CONTROL_MASK_SND_NKE => self.on_wakeup(request.address, for_us),
            MBUS_CONTROL_MASK_REQ_UD2 => self.on_data_request(for_us),
            MBUS_CONTROL_MASK_SND_UD => self.on_user_data(request),
            other => {
                warn!("Unsupported request, C 0x{other:02X}");
                SlaveAction::Ignore
            }
        }
    }

    /// SND_NKE wakeup: a network-layer wakeup also drops any selection
    /// (EN 13757-3, ch 7.1); every addressed device acknowledges
    /// (ch 5.4).
    fn on_wakeup(&mut self, address: u8, for_us: bool) -> SlaveAction {
        debug!("SND_NKE (0x{MBUS_CONTROL_MASK_SND_NKE:02X})");
        if address == MBUS_ADDRESS_NETWORK_LAYER {
            self.selected = false;
        }
        if for_us {
            SlaveAction::SendAck
        } else {
            SlaveAction::Ignore
        }
    }

    /// REQ_UD2 poll: answered when individually addressed or selected.
    fn on_data_request(&mut self, for_us: bool) -> SlaveAction {
        debug!("REQ_UD2 (0x{MBUS_CONTROL_MASK_REQ_UD2:02X})");
        if !self.selected && !for_us {
            return SlaveAction::Ignore;
        }
        SlaveAction::SendResponse(self.response.frame().clone())
    }

    fn on_user_data(&mut self, request: &MBusFrame) -> SlaveAction {
        match request.control_information {
            MBUS_CONTROL_INFO_DATA_SEND => self.on_data_send(request),
            MBUS_CONTROL_INFO_SELECT_SLAVE => self.on_select(request),
            ci => {
                debug!("SND_UD with unsupported CI 0x{ci:02X}");
                SlaveAction::Ignore
            }
        }
    }

    /// SND_UD/DATA_SEND carrying the set-primary-address command
    /// (DIF 01h, VIF 7Ah, new address). Only honored while selected.
    fn on_data_send(&mut self, request: &MBusFrame) -> SlaveAction {
        debug!(
            "SND_UD (0x{MBUS_CONTROL_MASK_SND_UD:02X}) INFO DATA (0x{MBUS_CONTROL_INFO_DATA_SEND:02X})"
        );
        if request.data.len() < 3 || request.data[0..2] != MBUS_DATA_SET_ADDRESS {
            return SlaveAction::Ignore;
        }
        if !self.selected {
            return SlaveAction::Ignore;
        }

        let address = request.data[2];
        if address > MBUS_MAX_PRIMARY_SLAVES {
            warn!("Refusing reserved primary address {address}");
            return SlaveAction::Ignore;
        }

        info!("Setting new primary address {address}");
        self.identity.primary_address = address;
        self.response.set_primary_address(address);
        SlaveAction::SendAck
    }

    /// SND_UD/SELECT_SLAVE: a matching mask selects the device; any
    /// non-matching mask deselects it, even if it was selected before.
    fn on_select(&mut self, request: &MBusFrame) -> SlaveAction {
        debug!(
            "SND_UD (0x{MBUS_CONTROL_MASK_SND_UD:02X}) SELECT SLAVE (0x{MBUS_CONTROL_INFO_SELECT_SLAVE:02X})"
        );
        let matched = match matches_secondary(&request.data, &self.identity.id_bcd) {
            Ok(matched) => matched,
            Err(e) => {
                warn!("Invalid selection telegram: {e}");
                false
            }
        };

        if matched {
            debug!(
                "Selected by secondary address, me {}",
                self.identity.secondary_address_string()
            );
            self.selected = true;
            SlaveAction::SendAck
        } else {
            self.selected = false;
            SlaveAction::Ignore
        }
    }
}

/// The emulated device: state machine, transport and jitter source wired
/// into the receive-then-react loop.
pub struct SlaveDevice<T, R> {
    state: SlaveState,
    transport: T,
    rng: R,
}

impl<T: MBusTransport, R: Rng + Send> SlaveDevice<T, R> {
    pub fn new(state: SlaveState, transport: T, rng: R) -> Self {
        SlaveDevice {
            state,
            transport,
            rng,
        }
    }

    pub fn state(&self) -> &SlaveState {
        &self.state
    }

    /// Runs the device until `shutdown` fires. Frames that fail to decode
    /// are discarded without a response; a slave cannot know whether a
    /// garbled telegram was meant for it, and the master retries on a
    /// missing ACK.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Listening, primary addr {}, secondary addr {}",
            self.state.primary_address(),
            self.state.identity.secondary_address_string()
        );
        loop {
            let request = tokio::select! {
                _ = shutdown.changed() => break,
                received = self.transport.recv_frame() => match received {
                    Ok(frame) => frame,
                    Err(e) => {
                        debug!("Discarding unreadable frame: {e}");
                        continue;
                    }
                },
            };
            self.react(&request).await;
        }
        info!("Shutting down");
    }

    /// Receives and reacts to exactly one frame. Receive errors propagate;
    /// send errors are reported and swallowed, the loop keeps listening.
    pub async fn process_next(&mut self) -> Result<(), MBusError> {
        let request = self.transport.recv_frame().await?;
        self.react(&request).await;
        Ok(())
    }

    async fn react(&mut self, request: &MBusFrame) {
        match self.state.step(request) {
            SlaveAction::Ignore => {}
            SlaveAction::SendAck => self.send_ack().await,
            SlaveAction::SendResponse(frame) => {
                if let Err(e) = self.transport.send_frame(&frame).await {
                    warn!("Failed sending response: {e}");
                }
            }
        }
    }

    /// ACK after a random sub-millisecond delay, so multiple devices
    /// answering the same broadcast do not collide on the bus.
    async fn send_ack(&mut self) {
        let jitter = Duration::from_micros(self.rng.gen_range(1..=1000));
        tokio::time::sleep(jitter).await;
        if let Err(e) = self.transport.send_frame(&MBusFrame::ack()).await {
            warn!("Failed sending ACK: {e}");
        }
    }
}
