//! Lumps: the values stored by the engine
//!
//! A lump is an opaque byte payload addressed by a 128-bit `LumpId`.
//! `LumpData` remembers where the caller intends the payload to live so
//! that large payloads can be filled directly into an aligned buffer and
//! handed to the data region without another copy.

use std::fmt;
use std::str::FromStr;

use crate::block::{AlignedBytes, BlockSize};
use crate::error::{LumpstoreError, Result};

/// Largest payload a data-region lump can hold (0xFFFF blocks minus the trailer)
pub const LUMP_MAX_SIZE: usize = 0xFFFF * BlockSize::MIN as usize - 2;

/// Largest payload that can be embedded in a journal record
pub const MAX_EMBEDDED_SIZE: usize = 0xFFFF;

// =============================================================================
// LumpId
// =============================================================================

/// 128-bit lump identifier; ordering is numeric
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LumpId(u128);

impl LumpId {
    /// Number of bytes in the big-endian encoding
    pub const SIZE: usize = 16;

    pub const fn new(id: u128) -> Self {
        LumpId(id)
    }

    pub const fn as_u128(self) -> u128 {
        self.0
    }

    pub fn to_be_bytes(self) -> [u8; Self::SIZE] {
        self.0.to_be_bytes()
    }

    pub fn from_be_bytes(bytes: [u8; Self::SIZE]) -> Self {
        LumpId(u128::from_be_bytes(bytes))
    }
}

impl From<u128> for LumpId {
    fn from(id: u128) -> Self {
        LumpId(id)
    }
}

impl FromStr for LumpId {
    type Err = LumpstoreError;

    /// Parses up to 32 hex digits, with or without a `0x` prefix
    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        u128::from_str_radix(digits, 16)
            .map(LumpId)
            .map_err(|e| LumpstoreError::invalid_input(format!("invalid lump id {:?}: {}", s, e)))
    }
}

impl fmt::Display for LumpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl fmt::Debug for LumpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LumpId(\"{}\")", self)
    }
}

// =============================================================================
// LumpData
// =============================================================================

/// A lump payload tagged with where it is meant to be stored
#[derive(Clone, PartialEq, Eq)]
pub struct LumpData(Inner);

#[derive(Clone, PartialEq, Eq)]
enum Inner {
    /// Inline in a journal record
    JournalRegion(Vec<u8>),
    /// Already in an aligned buffer, ready for the data region
    DataRegion(AlignedBytes),
    /// Plain bytes; copied into an aligned buffer at put time
    DataRegionUnaligned(Vec<u8>),
}

impl LumpData {
    /// Wraps a payload of at most `LUMP_MAX_SIZE` bytes
    pub fn new(data: Vec<u8>) -> Result<Self> {
        if data.len() > LUMP_MAX_SIZE {
            return Err(LumpstoreError::invalid_input(format!(
                "lump of {} bytes exceeds the maximum of {}",
                data.len(),
                LUMP_MAX_SIZE
            )));
        }
        Ok(LumpData(Inner::DataRegionUnaligned(data)))
    }

    /// Wraps a payload that must be embedded in the journal
    pub fn new_embedded(data: Vec<u8>) -> Result<Self> {
        if data.len() > MAX_EMBEDDED_SIZE {
            return Err(LumpstoreError::invalid_input(format!(
                "embedded lump of {} bytes exceeds the maximum of {}",
                data.len(),
                MAX_EMBEDDED_SIZE
            )));
        }
        Ok(LumpData(Inner::JournalRegion(data)))
    }

    /// Allocates a zeroed aligned buffer of `size` bytes to be filled in place
    pub fn aligned_allocate(size: usize, block_size: BlockSize) -> Result<Self> {
        if size > LUMP_MAX_SIZE {
            return Err(LumpstoreError::invalid_input(format!(
                "lump of {} bytes exceeds the maximum of {}",
                size, LUMP_MAX_SIZE
            )));
        }
        Ok(LumpData(Inner::DataRegion(AlignedBytes::new(size, block_size))))
    }

    pub(crate) fn from_aligned(bytes: AlignedBytes) -> Self {
        LumpData(Inner::DataRegion(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.0 {
            Inner::JournalRegion(data) | Inner::DataRegionUnaligned(data) => data,
            Inner::DataRegion(data) => data.as_bytes(),
        }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        match &mut self.0 {
            Inner::JournalRegion(data) | Inner::DataRegionUnaligned(data) => data,
            Inner::DataRegion(data) => data.as_bytes_mut(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the payload was created for journal embedding
    pub fn is_embedded(&self) -> bool {
        matches!(self.0, Inner::JournalRegion(_))
    }

    pub fn into_vec(self) -> Vec<u8> {
        match self.0 {
            Inner::JournalRegion(data) | Inner::DataRegionUnaligned(data) => data,
            Inner::DataRegion(data) => data.to_vec(),
        }
    }

    /// Converts into an aligned buffer for the data region, copying only
    /// when the payload is not already aligned to `block_size`.
    pub(crate) fn into_aligned(self, block_size: BlockSize) -> AlignedBytes {
        match self.0 {
            Inner::DataRegion(data) if data.block_size() == block_size => data,
            Inner::DataRegion(data) => AlignedBytes::from_bytes(data.as_bytes(), block_size),
            Inner::JournalRegion(data) | Inner::DataRegionUnaligned(data) => {
                AlignedBytes::from_bytes(&data, block_size)
            }
        }
    }
}

impl fmt::Debug for LumpData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.0 {
            Inner::JournalRegion(_) => "JournalRegion",
            Inner::DataRegion(_) => "DataRegion",
            Inner::DataRegionUnaligned(_) => "DataRegionUnaligned",
        };
        f.debug_struct("LumpData")
            .field("kind", &kind)
            .field("len", &self.len())
            .finish()
    }
}
