//! 40-bit addresses
//!
//! Every on-disk position in a storage (journal offsets, data-region block
//! numbers) is an `Address`. The 40-bit ceiling is part of the packed
//! portion encoding, so arithmetic refuses to leave that range.

use std::fmt;

use crate::error::{LumpstoreError, Result};

/// Largest representable address
pub const MAX_ADDRESS: u64 = (1 << 40) - 1;

/// A 40-bit unsigned address
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u64);

impl Address {
    /// Builds an address, failing above `MAX_ADDRESS`
    pub fn from_u64(value: u64) -> Result<Self> {
        if value > MAX_ADDRESS {
            return Err(LumpstoreError::invalid_input(format!(
                "address {} exceeds the 40-bit limit",
                value
            )));
        }
        Ok(Address(value))
    }

    /// Any `u32` fits, so this cannot fail
    pub const fn from_u32(value: u32) -> Self {
        Address(value as u64)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub fn checked_add(self, other: Address) -> Result<Self> {
        Address::from_u64(self.0 + other.0)
    }

    pub fn checked_sub(self, other: Address) -> Result<Self> {
        self.0
            .checked_sub(other.0)
            .map(Address)
            .ok_or_else(|| {
                LumpstoreError::invalid_input(format!(
                    "address underflow: {} - {}",
                    self.0, other.0
                ))
            })
    }

    /// Adds a raw offset; used by hot paths that would otherwise build a
    /// temporary `Address` for the operand.
    pub fn checked_add_u64(self, offset: u64) -> Result<Self> {
        match self.0.checked_add(offset) {
            Some(value) => Address::from_u64(value),
            None => Err(LumpstoreError::invalid_input("address overflow")),
        }
    }
}

impl From<u32> for Address {
    fn from(value: u32) -> Self {
        Address::from_u32(value)
    }
}

impl TryFrom<u64> for Address {
    type Error = LumpstoreError;

    fn try_from(value: u64) -> Result<Self> {
        Address::from_u64(value)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
