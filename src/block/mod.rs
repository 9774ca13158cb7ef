//! Block Module
//!
//! Block-size arithmetic and the aligned buffer used for every durable I/O.
//!
//! ## Why alignment matters
//! Files are opened with direct I/O, which requires offsets, lengths and the
//! memory address of the buffer to be multiples of the device block size.
//! `BlockSize` enforces the first two, `AlignedBytes` the third.

mod aligned_bytes;

pub use aligned_bytes::AlignedBytes;

use std::fmt;

use crate::error::{LumpstoreError, Result};

/// Size of one block in bytes: a positive multiple of 512
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockSize(u16);

impl BlockSize {
    /// Smallest (and default) block size
    pub const MIN: u16 = 512;

    pub const fn min() -> Self {
        BlockSize(Self::MIN)
    }

    pub fn new(size: u16) -> Result<Self> {
        if size < Self::MIN || size % Self::MIN != 0 {
            return Err(LumpstoreError::invalid_input(format!(
                "block size {} is not a positive multiple of {}",
                size,
                Self::MIN
            )));
        }
        Ok(BlockSize(size))
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }

    pub const fn as_u64(self) -> u64 {
        self.0 as u64
    }

    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Rounds `position` up to the next block boundary
    pub fn ceil_align(self, position: u64) -> u64 {
        let size = self.as_u64();
        position.div_ceil(size) * size
    }

    /// Rounds `position` down to the previous block boundary
    pub fn floor_align(self, position: u64) -> u64 {
        let size = self.as_u64();
        (position / size) * size
    }

    pub fn is_aligned(self, position: u64) -> bool {
        position % self.as_u64() == 0
    }

    /// Whether a buffer aligned to `self` is also aligned to `other`
    pub fn contains(self, other: BlockSize) -> bool {
        self.0 >= other.0 && self.0 % other.0 == 0
    }
}

impl Default for BlockSize {
    fn default() -> Self {
        BlockSize::min()
    }
}

impl fmt::Display for BlockSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
