//! End-to-end scenario tests for the slave state machine, run over the
//! mock transport with a seeded jitter source.

use mbus_device::constants::{
    MBUS_ADDRESS_BROADCAST_NOREPLY, MBUS_ADDRESS_BROADCAST_REPLY, MBUS_ADDRESS_NETWORK_LAYER,
    MBUS_CONTROL_INFO_DATA_SEND, MBUS_CONTROL_INFO_SELECT_SLAVE, MBUS_CONTROL_MASK_FCB,
    MBUS_CONTROL_MASK_REQ_UD2, MBUS_CONTROL_MASK_RSP_UD, MBUS_CONTROL_MASK_SND_NKE,
    MBUS_CONTROL_MASK_SND_UD,
};
use mbus_device::device::{DeviceIdentity, ResponsePayload, SlaveDevice, SlaveState};
use mbus_device::mbus::serial_mock::MockTransport;
use mbus_device::mbus::{MBusFrame, MBusFrameType};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Device under test at primary address 5, serving the built-in telegram.
fn device(address: u8) -> (SlaveDevice<MockTransport, StdRng>, MockTransport) {
    let payload = ResponsePayload::default_response(address);
    let identity = DeviceIdentity::from_response_frame(payload.frame(), address).unwrap();
    let bus = MockTransport::new();
    let device = SlaveDevice::new(
        SlaveState::new(identity, payload),
        bus.clone(),
        StdRng::seed_from_u64(42),
    );
    (device, bus)
}

fn select_frame(mask: [u8; 4]) -> MBusFrame {
    let mut data = mask.to_vec();
    data.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
    MBusFrame::long(
        MBUS_CONTROL_MASK_SND_UD,
        MBUS_ADDRESS_NETWORK_LAYER,
        MBUS_CONTROL_INFO_SELECT_SLAVE,
        data,
    )
}

/// Own identification number, BCD, least significant byte first.
const OWN_ID: [u8; 4] = [0x78, 0x56, 0x34, 0x12];

#[tokio::test]
async fn req_ud2_poll_returns_payload_with_own_address() {
    let (mut device, bus) = device(5);
    bus.queue_rx_frame(&MBusFrame::short(MBUS_CONTROL_MASK_REQ_UD2, 5));
    device.process_next().await.unwrap();

    let sent = bus.tx_frames();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].frame_type, MBusFrameType::Long);
    assert_eq!(sent[0].control, MBUS_CONTROL_MASK_RSP_UD);
    assert_eq!(sent[0].address, 5);
    assert_eq!(sent[0].control_information, 0x72);
}

#[tokio::test]
async fn req_ud2_with_fcb_set_is_still_answered() {
    let (mut device, bus) = device(5);
    bus.queue_rx_frame(&MBusFrame::short(
        MBUS_CONTROL_MASK_REQ_UD2 | MBUS_CONTROL_MASK_FCB,
        5,
    ));
    device.process_next().await.unwrap();
    assert_eq!(bus.tx_frames().len(), 1);
}

#[tokio::test]
async fn poll_for_other_address_is_ignored() {
    let (mut device, bus) = device(5);
    bus.queue_rx_frame(&MBusFrame::short(MBUS_CONTROL_MASK_REQ_UD2, 6));
    device.process_next().await.unwrap();
    assert!(bus.tx_data().is_empty());
}

#[tokio::test]
async fn broadcast_noreply_never_answers() {
    let (mut device, bus) = device(5);
    bus.queue_rx_frame(&MBusFrame::short(
        MBUS_CONTROL_MASK_SND_NKE,
        MBUS_ADDRESS_BROADCAST_NOREPLY,
    ));
    device.process_next().await.unwrap();
    assert!(bus.tx_data().is_empty());
}

#[tokio::test]
async fn network_layer_wakeup_acks_and_deselects() {
    let (mut device, bus) = device(5);

    bus.queue_rx_frame(&select_frame(OWN_ID));
    device.process_next().await.unwrap();
    assert!(device.state().is_selected());

    bus.queue_rx_frame(&MBusFrame::short(
        MBUS_CONTROL_MASK_SND_NKE,
        MBUS_ADDRESS_NETWORK_LAYER,
    ));
    device.process_next().await.unwrap();

    assert!(!device.state().is_selected());
    // One ACK for the selection, one for the wakeup.
    assert_eq!(bus.tx_data(), vec![0xE5, 0xE5]);
}

#[tokio::test]
async fn unicast_wakeup_acks_without_deselecting() {
    let (mut device, bus) = device(5);

    bus.queue_rx_frame(&select_frame(OWN_ID));
    device.process_next().await.unwrap();

    bus.queue_rx_frame(&MBusFrame::short(MBUS_CONTROL_MASK_SND_NKE, 5));
    device.process_next().await.unwrap();

    assert!(device.state().is_selected());
    assert_eq!(bus.tx_data(), vec![0xE5, 0xE5]);
}

#[tokio::test]
async fn selection_enables_broadcast_polling() {
    let (mut device, bus) = device(5);

    bus.queue_rx_frame(&select_frame(OWN_ID));
    device.process_next().await.unwrap();
    assert!(device.state().is_selected());
    assert_eq!(bus.tx_data(), vec![0xE5]);

    bus.queue_rx_frame(&MBusFrame::short(
        MBUS_CONTROL_MASK_REQ_UD2,
        MBUS_ADDRESS_BROADCAST_REPLY,
    ));
    device.process_next().await.unwrap();

    let sent = bus.tx_frames();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].control, MBUS_CONTROL_MASK_RSP_UD);
    assert_eq!(sent[1].address, 5);
}

#[tokio::test]
async fn non_matching_mask_deselects_previously_selected_device() {
    let (mut device, bus) = device(5);

    bus.queue_rx_frame(&select_frame(OWN_ID));
    device.process_next().await.unwrap();
    assert!(device.state().is_selected());

    // 87654321 does not match 12345678; no ACK, selection dropped.
    bus.queue_rx_frame(&select_frame([0x21, 0x43, 0x65, 0x87]));
    device.process_next().await.unwrap();

    assert!(!device.state().is_selected());
    assert_eq!(bus.tx_data(), vec![0xE5]);
}

#[tokio::test]
async fn malformed_selection_block_counts_as_no_match() {
    let (mut device, bus) = device(5);

    bus.queue_rx_frame(&select_frame(OWN_ID));
    device.process_next().await.unwrap();
    assert!(device.state().is_selected());

    // 4-byte selection block instead of 8.
    bus.queue_rx_frame(&MBusFrame::long(
        MBUS_CONTROL_MASK_SND_UD,
        MBUS_ADDRESS_NETWORK_LAYER,
        MBUS_CONTROL_INFO_SELECT_SLAVE,
        OWN_ID.to_vec(),
    ));
    device.process_next().await.unwrap();

    assert!(!device.state().is_selected());
}

#[tokio::test]
async fn set_address_is_ignored_outside_selection() {
    let (mut device, bus) = device(5);
    bus.queue_rx_frame(&MBusFrame::long(
        MBUS_CONTROL_MASK_SND_UD,
        5,
        MBUS_CONTROL_INFO_DATA_SEND,
        vec![0x01, 0x7A, 0x09],
    ));
    device.process_next().await.unwrap();

    assert!(bus.tx_data().is_empty());
    assert_eq!(device.state().primary_address(), 5);
}

#[tokio::test]
async fn set_address_while_selected_moves_the_device() {
    let (mut device, bus) = device(5);

    bus.queue_rx_frame(&select_frame(OWN_ID));
    device.process_next().await.unwrap();

    bus.queue_rx_frame(&MBusFrame::long(
        MBUS_CONTROL_MASK_SND_UD,
        5,
        MBUS_CONTROL_INFO_DATA_SEND,
        vec![0x01, 0x7A, 0x09],
    ));
    device.process_next().await.unwrap();

    assert_eq!(device.state().primary_address(), 9);
    assert_eq!(bus.tx_data(), vec![0xE5, 0xE5]);

    // The device now answers at 9, not at 5, and the served telegram
    // carries the new address.
    bus.clear();
    bus.queue_rx_frame(&MBusFrame::short(MBUS_CONTROL_MASK_REQ_UD2, 5));
    device.process_next().await.unwrap();
    assert!(bus.tx_data().is_empty());

    bus.queue_rx_frame(&MBusFrame::short(MBUS_CONTROL_MASK_REQ_UD2, 9));
    device.process_next().await.unwrap();
    let sent = bus.tx_frames();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].address, 9);
}

#[tokio::test]
async fn reserved_primary_address_is_refused() {
    let (mut device, bus) = device(5);

    bus.queue_rx_frame(&select_frame(OWN_ID));
    device.process_next().await.unwrap();
    bus.clear();

    bus.queue_rx_frame(&MBusFrame::long(
        MBUS_CONTROL_MASK_SND_UD,
        5,
        MBUS_CONTROL_INFO_DATA_SEND,
        vec![0x01, 0x7A, 0xFE],
    ));
    device.process_next().await.unwrap();

    assert!(bus.tx_data().is_empty());
    assert_eq!(device.state().primary_address(), 5);
}

#[tokio::test]
async fn garbled_frame_gets_no_response() {
    let (mut device, bus) = device(5);
    // Short frame with a wrong checksum byte.
    bus.queue_rx_data(&[0x10, 0x5B, 0x05, 0x00, 0x16]);
    assert!(device.process_next().await.is_err());
    assert!(bus.tx_data().is_empty());
}

#[tokio::test]
async fn received_ack_byte_is_ignored() {
    let (mut device, bus) = device(5);
    bus.queue_rx_data(&[0xE5]);
    device.process_next().await.unwrap();
    assert!(bus.tx_data().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_loop_reacts_and_stops_on_shutdown() {
    let (mut device, bus) = device(5);
    bus.queue_rx_frame(&MBusFrame::short(MBUS_CONTROL_MASK_REQ_UD2, 5));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(async move {
        device.run(shutdown_rx).await;
    });

    // Give the loop time to serve the queued poll, then stop it.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(1), handle)
        .await
        .expect("run loop did not stop on shutdown")
        .unwrap();

    assert_eq!(bus.tx_frames().len(), 1);
}
