//! Non-Volatile Memory Module
//!
//! The block-aligned byte store every region is written through.
//!
//! ## Views
//! ```text
//!   whole device        [0 ............................... capacity)
//!   split(header_end)   [header) [body ..........................)
//!   body.split(j_end)            [journal ....) [data ............)
//! ```
//! A split hands out two views over the same backing storage. Each view has
//! its own cursor and capacity and cannot reach outside its slice. The
//! backing storage is released once the last view is dropped.

mod file;
mod header;
mod memory;

pub use file::{FileNvm, LUSF_EXTENSION};
pub use header::{
    StorageHeader, FULL_HEADER_SIZE, HEADER_SIZE, MAGIC_NUMBER, MAJOR_VERSION,
    MAX_DATA_REGION_SIZE, MAX_JOURNAL_REGION_SIZE, MINOR_VERSION,
};
pub use memory::MemoryNvm;

use std::io::SeekFrom;

use crate::block::BlockSize;
use crate::error::{LumpstoreError, Result};

/// A seekable store that only accepts block-aligned I/O
pub trait NonVolatileMemory: Sized + Send {
    /// Makes every completed write durable
    fn sync(&mut self) -> Result<()>;

    /// Current cursor, relative to the start of this view
    fn position(&self) -> u64;

    /// Usable bytes in this view
    fn capacity(&self) -> u64;

    fn block_size(&self) -> BlockSize;

    /// Splits this view at `position` into `[0, position)` and `[position, capacity)`
    fn split(self, position: u64) -> Result<(Self, Self)>;

    /// Moves the cursor; the target must be block aligned and within capacity
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    /// Reads up to `buf.len()` bytes; the length must be block aligned.
    /// Returns fewer bytes only at the end of the view.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Writes all of `buf`; the length must be block aligned and fit in the view
    fn write(&mut self, buf: &[u8]) -> Result<usize>;
}

/// Resolves a seek target against a view, enforcing alignment and bounds
pub(crate) fn resolve_seek(
    pos: SeekFrom,
    current: u64,
    capacity: u64,
    block_size: BlockSize,
) -> Result<u64> {
    let target = match pos {
        SeekFrom::Start(offset) => Some(offset),
        SeekFrom::Current(delta) => current.checked_add_signed(delta),
        SeekFrom::End(delta) => capacity.checked_add_signed(delta),
    };
    let target = target.ok_or_else(|| {
        LumpstoreError::invalid_input(format!("seek {:?} moves before the start of the view", pos))
    })?;
    if !block_size.is_aligned(target) {
        return Err(LumpstoreError::invalid_input(format!(
            "seek target {} is not aligned to {}-byte blocks",
            target, block_size
        )));
    }
    if target > capacity {
        return Err(LumpstoreError::invalid_input(format!(
            "seek target {} is beyond the view capacity {}",
            target, capacity
        )));
    }
    Ok(target)
}

/// Rejects buffers whose length is not a multiple of the block size
pub(crate) fn check_buffer_len(len: usize, block_size: BlockSize) -> Result<()> {
    if !block_size.is_aligned(len as u64) {
        return Err(LumpstoreError::invalid_input(format!(
            "buffer length {} is not aligned to {}-byte blocks",
            len, block_size
        )));
    }
    Ok(())
}

/// Validates a split point for a view of `capacity` bytes
pub(crate) fn check_split_position(
    position: u64,
    capacity: u64,
    block_size: BlockSize,
) -> Result<()> {
    if !block_size.is_aligned(position) || position > capacity {
        return Err(LumpstoreError::invalid_input(format!(
            "cannot split a {}-byte view at {}",
            capacity, position
        )));
    }
    Ok(())
}
