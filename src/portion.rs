//! Portions: compact descriptors of on-disk ranges
//!
//! ## Packed layouts (one `u64` each)
//!
//! ```text
//! FreePortion:  | len: 24 bits (blocks)   | start: 40 bits (block) |
//!
//! Portion:      | kind: 1 | -- | len: 16 | start: 40               |
//!                 1 = data region (len in blocks, start in blocks)
//!                 0 = journal   (len in bytes,  start is a ring offset)
//! ```

use std::cmp;

use crate::address::Address;
use crate::block::BlockSize;
use crate::error::invariant_violation;

const START_MASK: u64 = (1 << 40) - 1;
const DATA_KIND_BIT: u64 = 1 << 63;

// =============================================================================
// FreePortion
// =============================================================================

/// A run of free blocks owned by the allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FreePortion(u64);

impl FreePortion {
    /// Length ceiling imposed by the 24-bit field
    pub const MAX_LEN: u32 = 0xFF_FFFF;

    pub fn new(start: Address, len: u32) -> Self {
        if len > Self::MAX_LEN {
            invariant_violation(format!(
                "free portion length {} exceeds {}",
                len,
                Self::MAX_LEN
            ));
        }
        FreePortion(((len as u64) << 40) | start.as_u64())
    }

    pub fn start(self) -> Address {
        Address::from_u64(self.0 & START_MASK).unwrap_or_default()
    }

    pub fn len(self) -> u32 {
        (self.0 >> 40) as u32
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }

    /// One past the last block
    pub fn end(self) -> u64 {
        self.start().as_u64() + self.len() as u64
    }

    /// Grows the portion by `blocks`, or `None` if that overflows the length field
    pub fn checked_extend(self, blocks: u32) -> Option<FreePortion> {
        let len = self.len().checked_add(blocks)?;
        if len > Self::MAX_LEN {
            return None;
        }
        Some(FreePortion::new(self.start(), len))
    }

    /// Cuts `size` blocks off the front, returning `(remainder, allocated)`
    pub fn slice_part(self, size: u16) -> (FreePortion, DataPortion) {
        let size32 = size as u32;
        if size32 > self.len() {
            invariant_violation(format!(
                "cannot slice {} blocks out of a {}-block free portion",
                size,
                self.len()
            ));
        }
        let allocated = DataPortion {
            start: self.start(),
            len: size,
        };
        let rest_start = Address::from_u64(self.start().as_u64() + size as u64)
            .unwrap_or_else(|e| invariant_violation(e));
        (FreePortion::new(rest_start, self.len() - size32), allocated)
    }

    pub(crate) fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<DataPortion> for FreePortion {
    fn from(portion: DataPortion) -> Self {
        FreePortion::new(portion.start, portion.len as u32)
    }
}

// =============================================================================
// DataPortion / JournalPortion
// =============================================================================

/// A range in the data region, measured in blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataPortion {
    pub start: Address,
    pub len: u16,
}

impl DataPortion {
    pub fn end(&self) -> u64 {
        self.start.as_u64() + self.len as u64
    }

    /// `(byte offset, byte length)` for the given block size
    pub fn as_byte_range(&self, block_size: BlockSize) -> (u64, u64) {
        let bs = block_size.as_u64();
        (self.start.as_u64() * bs, self.len as u64 * bs)
    }
}

/// A payload embedded in the journal ring, measured in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JournalPortion {
    pub start: Address,
    pub len: u16,
}

// =============================================================================
// Portion
// =============================================================================

/// Where a lump's payload currently lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Portion {
    Journal(JournalPortion),
    Data(DataPortion),
}

impl Portion {
    pub fn to_packed(self) -> u64 {
        match self {
            Portion::Journal(p) => ((p.len as u64) << 40) | p.start.as_u64(),
            Portion::Data(p) => DATA_KIND_BIT | ((p.len as u64) << 40) | p.start.as_u64(),
        }
    }

    pub fn from_packed(packed: u64) -> Self {
        let start = Address::from_u64(packed & START_MASK).unwrap_or_default();
        let len = (packed >> 40) as u16;
        if packed & DATA_KIND_BIT != 0 {
            Portion::Data(DataPortion { start, len })
        } else {
            Portion::Journal(JournalPortion { start, len })
        }
    }

    /// Bytes the payload occupies on disk
    pub fn len_on_disk(self, block_size: BlockSize) -> u64 {
        match self {
            Portion::Journal(p) => p.len as u64,
            Portion::Data(p) => p.len as u64 * block_size.as_u64(),
        }
    }
}

// =============================================================================
// Orderings used by the allocator indexes
// =============================================================================

/// Orders free portions by `(len, start)` for best-fit lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SizeBasedPortion(pub FreePortion);

impl Ord for SizeBasedPortion {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        (self.0.len(), self.0.start()).cmp(&(other.0.len(), other.0.start()))
    }
}

impl PartialOrd for SizeBasedPortion {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Orders free portions by end block for adjacency lookup
#[derive(Debug, Clone, Copy)]
pub(crate) struct EndBasedPortion(pub FreePortion);

impl PartialEq for EndBasedPortion {
    fn eq(&self, other: &Self) -> bool {
        self.0.end() == other.0.end()
    }
}

impl Eq for EndBasedPortion {}

impl Ord for EndBasedPortion {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.0.end().cmp(&other.0.end())
    }
}

impl PartialOrd for EndBasedPortion {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}
