//! In-memory NVM
//!
//! Backs tests and benchmarks. Cloning a view shares the same bytes, which
//! lets a test drop a `Storage` without syncing and reopen the same memory
//! to observe what survived.

use std::io::SeekFrom;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{check_buffer_len, check_split_position, resolve_seek, NonVolatileMemory};
use crate::block::BlockSize;
use crate::error::{LumpstoreError, Result};

/// NVM over a shared, heap-allocated byte vector
#[derive(Debug, Clone)]
pub struct MemoryNvm {
    bytes: Arc<Mutex<Vec<u8>>>,
    view_start: u64,
    view_end: u64,
    position: u64,
    block_size: BlockSize,
}

impl MemoryNvm {
    /// Creates a zeroed store of `capacity` bytes with 512-byte blocks
    pub fn new(capacity: u64) -> Result<Self> {
        Self::with_block_size(capacity, BlockSize::min())
    }

    pub fn with_block_size(capacity: u64, block_size: BlockSize) -> Result<Self> {
        let len = usize::try_from(capacity)
            .map_err(|_| LumpstoreError::invalid_input("memory NVM capacity too large"))?;
        Self::from_vec(vec![0; len], block_size)
    }

    /// Wraps existing bytes; the length must be block aligned
    pub fn from_vec(bytes: Vec<u8>, block_size: BlockSize) -> Result<Self> {
        let capacity = bytes.len() as u64;
        if !block_size.is_aligned(capacity) {
            return Err(LumpstoreError::invalid_input(format!(
                "memory NVM capacity {} is not aligned to {}-byte blocks",
                capacity, block_size
            )));
        }
        Ok(MemoryNvm {
            bytes: Arc::new(Mutex::new(bytes)),
            view_start: 0,
            view_end: capacity,
            position: 0,
            block_size,
        })
    }

    /// Copies out the bytes of this view
    pub fn to_vec(&self) -> Vec<u8> {
        let bytes = self.bytes.lock();
        bytes[self.view_start as usize..self.view_end as usize].to_vec()
    }

    /// Runs `f` over the mutable bytes of this view, bypassing alignment checks
    pub fn with_bytes_mut<T>(&self, f: impl FnOnce(&mut [u8]) -> T) -> T {
        let mut bytes = self.bytes.lock();
        f(&mut bytes[self.view_start as usize..self.view_end as usize])
    }

    fn absolute(&self) -> usize {
        (self.view_start + self.position) as usize
    }
}

impl NonVolatileMemory for MemoryNvm {
    fn sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn capacity(&self) -> u64 {
        self.view_end - self.view_start
    }

    fn block_size(&self) -> BlockSize {
        self.block_size
    }

    fn split(self, position: u64) -> Result<(Self, Self)> {
        check_split_position(position, self.capacity(), self.block_size)?;
        let boundary = self.view_start + position;
        let left = MemoryNvm {
            bytes: Arc::clone(&self.bytes),
            view_start: self.view_start,
            view_end: boundary,
            position: 0,
            block_size: self.block_size,
        };
        let right = MemoryNvm {
            bytes: self.bytes,
            view_start: boundary,
            view_end: self.view_end,
            position: 0,
            block_size: self.block_size,
        };
        Ok((left, right))
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.position = resolve_seek(pos, self.position, self.capacity(), self.block_size)?;
        Ok(self.position)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        check_buffer_len(buf.len(), self.block_size)?;
        let available = (self.capacity() - self.position) as usize;
        let len = buf.len().min(available);
        let start = self.absolute();
        {
            let bytes = self.bytes.lock();
            buf[..len].copy_from_slice(&bytes[start..start + len]);
        }
        self.position += len as u64;
        Ok(len)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        check_buffer_len(buf.len(), self.block_size)?;
        if self.position + buf.len() as u64 > self.capacity() {
            return Err(LumpstoreError::invalid_input(format!(
                "write of {} bytes at {} overruns the {}-byte view",
                buf.len(),
                self.position,
                self.capacity()
            )));
        }
        let start = self.absolute();
        {
            let mut bytes = self.bytes.lock();
            bytes[start..start + buf.len()].copy_from_slice(buf);
        }
        self.position += buf.len() as u64;
        Ok(buf.len())
    }
}
