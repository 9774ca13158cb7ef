//! Tests for Address
//!
//! These tests verify:
//! - The 40-bit limit on construction and arithmetic
//! - Round-tripping through u64 for every valid value

use lumpstore::address::{Address, MAX_ADDRESS};
use lumpstore::LumpstoreError;
use proptest::prelude::*;

// =============================================================================
// Construction Tests
// =============================================================================

#[test]
fn test_max_address_is_accepted() {
    let address = Address::from_u64(MAX_ADDRESS).unwrap();
    assert_eq!(address.as_u64(), (1 << 40) - 1);
}

#[test]
fn test_address_above_limit_is_rejected() {
    let result = Address::from_u64(MAX_ADDRESS + 1);
    assert!(matches!(result, Err(LumpstoreError::InvalidInput(_))));

    let result = Address::try_from(u64::MAX);
    assert!(result.is_err());
}

#[test]
fn test_from_u32_and_display() {
    let address = Address::from(1234u32);
    assert_eq!(address, Address::from_u32(1234));
    assert_eq!(address.to_string(), "1234");
}

// =============================================================================
// Arithmetic Tests
// =============================================================================

#[test]
fn test_checked_add_respects_limit() {
    let a = Address::from_u64(MAX_ADDRESS - 10).unwrap();
    assert_eq!(a.checked_add(Address::from(10u32)).unwrap().as_u64(), MAX_ADDRESS);
    assert!(a.checked_add(Address::from(11u32)).is_err());
    assert!(a.checked_add_u64(11).is_err());
    assert!(a.checked_add_u64(u64::MAX).is_err());
}

#[test]
fn test_checked_sub_underflow() {
    let a = Address::from(5u32);
    assert_eq!(a.checked_sub(Address::from(5u32)).unwrap().as_u64(), 0);
    assert!(a.checked_sub(Address::from(6u32)).is_err());
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn prop_address_round_trips(value in 0..=MAX_ADDRESS) {
        let address = Address::from_u64(value).unwrap();
        prop_assert_eq!(Address::from_u64(address.as_u64()).unwrap(), address);
    }

    #[test]
    fn prop_out_of_range_fails(value in (MAX_ADDRESS + 1)..=u64::MAX) {
        prop_assert!(Address::from_u64(value).is_err());
    }
}
