//! Data region
//!
//! ## Record Format
//!
//! ```text
//! ┌──────────────────┬────────────────┬──────────────────────┐
//! │ payload (n)      │ padding (p)    │ p: u16 BE            │
//! └──────────────────┴────────────────┴──────────────────────┘
//! └────────────── n + p + 2 = whole number of blocks ────────┘
//! ```
//!
//! Space for each record comes from the data-portion allocator.

use std::io::SeekFrom;

use crate::allocator::DataPortionAllocator;
use crate::block::{AlignedBytes, BlockSize};
use crate::error::{LumpstoreError, Result};
use crate::lump::LumpData;
use crate::nvm::NonVolatileMemory;
use crate::portion::{DataPortion, FreePortion};

const TRAILER_SIZE: usize = 2;

/// Large-payload storage area of a storage file
pub struct DataRegion<N> {
    allocator: Box<dyn DataPortionAllocator>,
    nvm: N,
    block_size: BlockSize,
}

impl<N: NonVolatileMemory> DataRegion<N> {
    pub fn new(allocator: Box<dyn DataPortionAllocator>, nvm: N, block_size: BlockSize) -> Self {
        DataRegion {
            allocator,
            nvm,
            block_size,
        }
    }

    pub fn block_size(&self) -> BlockSize {
        self.block_size
    }

    /// Region size in bytes
    pub fn capacity(&self) -> u64 {
        self.nvm.capacity()
    }

    /// Appends the trailer, allocates space and writes the record
    pub fn put(&mut self, mut data: AlignedBytes) -> Result<DataPortion> {
        let payload_len = data.len();
        let record_len = payload_len + TRAILER_SIZE;
        data.align_resize(record_len);

        let aligned_len = data.len();
        let blocks = aligned_len / self.block_size.as_usize();
        let blocks = u16::try_from(blocks).map_err(|_| {
            LumpstoreError::invalid_input(format!(
                "lump of {} bytes needs {} blocks, more than {}",
                payload_len,
                blocks,
                u16::MAX
            ))
        })?;

        let padding = (aligned_len - record_len) as u16;
        data.as_bytes_mut()[aligned_len - TRAILER_SIZE..].copy_from_slice(&padding.to_be_bytes());

        let portion = self.allocator.allocate(blocks)?;
        if let Err(e) = self.write_at(portion, data.as_bytes()) {
            self.allocator.release(portion);
            return Err(e);
        }
        Ok(portion)
    }

    fn write_at(&mut self, portion: DataPortion, bytes: &[u8]) -> Result<()> {
        let (offset, _) = portion.as_byte_range(self.block_size);
        self.nvm.seek(SeekFrom::Start(offset))?;
        self.nvm.write(bytes)?;
        Ok(())
    }

    /// Reads a whole record and strips padding and trailer
    pub fn get(&mut self, portion: DataPortion) -> Result<LumpData> {
        let (offset, len) = portion.as_byte_range(self.block_size);
        let mut buf = AlignedBytes::new(len as usize, self.block_size);
        self.nvm.seek(SeekFrom::Start(offset))?;
        self.nvm.read(buf.as_bytes_mut())?;

        let payload_len = payload_len_from_trailer(buf.as_bytes())?;
        buf.truncate(payload_len);
        Ok(LumpData::from_aligned(buf))
    }

    /// Payload length, read from the record's last block only
    pub fn get_size(&mut self, portion: DataPortion) -> Result<usize> {
        let (offset, len) = portion.as_byte_range(self.block_size);
        let block = self.block_size.as_u64();
        let mut last = AlignedBytes::new(block as usize, self.block_size);
        self.nvm.seek(SeekFrom::Start(offset + len - block))?;
        self.nvm.read(last.as_bytes_mut())?;

        let padding = trailer_padding(last.as_bytes()) as u64;
        if padding + TRAILER_SIZE as u64 > block {
            return Err(corrupted_trailer(padding));
        }
        Ok((len - padding - TRAILER_SIZE as u64) as usize)
    }

    /// Reads `length` payload bytes starting at `start`
    ///
    /// Only the blocks covering the range are read, extended to the final
    /// block when the range comes close enough to the end that the trailer
    /// is needed to bound it.
    pub fn get_with_offset(
        &mut self,
        portion: DataPortion,
        start: usize,
        length: usize,
    ) -> Result<Vec<u8>> {
        let (offset, record_len) = portion.as_byte_range(self.block_size);
        let record_len = record_len as usize;
        let block = self.block_size.as_usize();
        let end = start.checked_add(length).unwrap_or(usize::MAX);
        if end > record_len - TRAILER_SIZE {
            return Err(out_of_range(start, length));
        }

        // Any payload is longer than record_len - block - 1, so ranges that
        // end at or below that never need the trailer.
        let needs_trailer = end + block + 1 > record_len;
        let read_start = self.block_size.floor_align(start as u64) as usize;
        let read_end = if needs_trailer {
            record_len
        } else {
            self.block_size.ceil_align(end as u64) as usize
        };

        let mut buf = AlignedBytes::new(read_end - read_start, self.block_size);
        self.nvm.seek(SeekFrom::Start(offset + read_start as u64))?;
        self.nvm.read(buf.as_bytes_mut())?;

        if needs_trailer {
            let bytes = buf.as_bytes();
            let padding = trailer_padding(bytes) as usize;
            let payload_len = record_len
                .checked_sub(padding + TRAILER_SIZE)
                .ok_or_else(|| corrupted_trailer(padding as u64))?;
            if end > payload_len {
                return Err(out_of_range(start, length));
            }
        }

        let skip = start - read_start;
        Ok(buf.as_bytes()[skip..skip + length].to_vec())
    }

    /// Returns the portion's blocks to the allocator
    pub fn release(&mut self, portion: DataPortion) {
        self.allocator.release(portion);
    }

    pub fn free_bytes(&self) -> u64 {
        self.allocator.free_blocks() * self.block_size.as_u64()
    }

    pub fn max_free_run_bytes(&self) -> u64 {
        self.allocator.max_free_run() as u64 * self.block_size.as_u64()
    }

    pub fn free_portions(&self) -> Vec<FreePortion> {
        self.allocator.free_portions()
    }

    pub fn allocation_status(&self, blocks_per_point: u64, total_blocks: u64) -> Vec<f64> {
        self.allocator.allocation_status(blocks_per_point, total_blocks)
    }

    pub fn sync(&mut self) -> Result<()> {
        self.nvm.sync()
    }
}

fn trailer_padding(record: &[u8]) -> u16 {
    let len = record.len();
    u16::from_be_bytes([record[len - 2], record[len - 1]])
}

fn payload_len_from_trailer(record: &[u8]) -> Result<usize> {
    let padding = trailer_padding(record) as usize;
    record
        .len()
        .checked_sub(padding + TRAILER_SIZE)
        .ok_or_else(|| corrupted_trailer(padding as u64))
}

fn corrupted_trailer(padding: u64) -> LumpstoreError {
    LumpstoreError::corrupted(format!(
        "data region trailer declares {} padding bytes, more than the record holds",
        padding
    ))
}

fn out_of_range(start: usize, length: usize) -> LumpstoreError {
    LumpstoreError::invalid_input(format!(
        "range {}..{} exceeds the lump payload",
        start,
        start.saturating_add(length)
    ))
}
