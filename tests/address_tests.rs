//! Tests for the address resolver: primary address matching including the
//! reserved addresses, and secondary-address wildcard selection.

use mbus_device::constants::{
    MBUS_ADDRESS_BROADCAST_NOREPLY, MBUS_ADDRESS_BROADCAST_REPLY, MBUS_ADDRESS_NETWORK_LAYER,
};
use mbus_device::device::{matches_primary, matches_secondary};
use mbus_device::MBusError;

/// Identification number 12345678, BCD, least significant byte first.
const ID: [u8; 4] = [0x78, 0x56, 0x34, 0x12];

fn selection(mask: [u8; 4]) -> Vec<u8> {
    let mut data = mask.to_vec();
    data.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
    data
}

#[test]
fn test_primary_address_truth_table() {
    for addr in 0u8..=255 {
        let expected = addr == 5
            || addr == MBUS_ADDRESS_BROADCAST_REPLY
            || addr == MBUS_ADDRESS_NETWORK_LAYER;
        assert_eq!(matches_primary(addr, 5), expected, "address {addr}");
    }
    assert!(!matches_primary(MBUS_ADDRESS_BROADCAST_NOREPLY, 5));
}

#[test]
fn test_full_wildcard_mask_matches_any_id() {
    assert!(matches_secondary(&selection([0xFF; 4]), &ID).unwrap());
    assert!(matches_secondary(&selection([0xFF; 4]), &[0x99, 0x99, 0x99, 0x99]).unwrap());
}

#[test]
fn test_exact_mask_matches_only_own_id() {
    assert!(matches_secondary(&selection(ID), &ID).unwrap());
    assert!(!matches_secondary(&selection(ID), &[0x79, 0x56, 0x34, 0x12]).unwrap());
}

/// Every non-wildcard nibble must agree: a mask sharing just one digit
/// with the id must not select the device. (An implementation with
/// any-digit-matches semantics would return true for this mask.)
#[test]
fn test_and_semantics_not_or() {
    // Digit '1' in the most significant position agrees with 12345678,
    // all other fixed digits disagree.
    let mask = [0x00, 0x00, 0x00, 0x19];
    assert!(!matches_secondary(&selection(mask), &ID).unwrap());

    // Mixed wildcards: 1234FFFF selects 12345678 but not 12995678.
    let mask = [0xFF, 0xFF, 0x34, 0x12];
    assert!(matches_secondary(&selection(mask), &ID).unwrap());
    assert!(!matches_secondary(&selection(mask), &[0x78, 0x56, 0x99, 0x12]).unwrap());
}

#[test]
fn test_selection_block_must_be_eight_bytes() {
    for len in [0usize, 4, 7, 9, 16] {
        let data = vec![0xFFu8; len];
        match matches_secondary(&data, &ID) {
            Err(MBusError::InvalidSelectionLength(n)) => assert_eq!(n, len),
            other => panic!("expected InvalidSelectionLength, got {other:?}"),
        }
    }
}
