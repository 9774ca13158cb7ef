//! Write-back block buffer over the journal ring
//!
//! Journal records are small and unaligned, while the NVM only accepts
//! whole blocks. `JournalNvmBuffer` accepts arbitrary positions and lengths
//! through `std::io::{Read, Write, Seek}` and turns them into block I/O:
//!
//! ```text
//!            write_buf_offset
//!                  │
//!   ring:  ... ────▼──────────┬──────────┬───── ...
//!                  │ block k  │ block k+1│
//!   write_buf:     [##########|#####     ]   (dirty until flushed)
//! ```
//!
//! - writes inside (or directly after) the buffered window are staged
//! - a write elsewhere flushes the window and starts a new one; an
//!   unaligned start loads its block from the NVM first
//! - after a flush the last block stays buffered, since the next append
//!   usually continues inside it
//! - reads flush first when they overlap dirty bytes

use std::cmp;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::block::{AlignedBytes, BlockSize};
use crate::error::{invariant_violation, LumpstoreError, Result};
use crate::nvm::NonVolatileMemory;

/// Block-buffering adapter between the ring and its NVM view
#[derive(Debug)]
pub struct JournalNvmBuffer<N> {
    nvm: N,
    position: u64,
    write_buf: AlignedBytes,
    write_buf_offset: u64,
    maybe_dirty: bool,
    read_buf: AlignedBytes,
}

impl<N: NonVolatileMemory> JournalNvmBuffer<N> {
    pub fn new(nvm: N) -> Self {
        let block_size = nvm.block_size();
        JournalNvmBuffer {
            nvm,
            position: 0,
            write_buf: AlignedBytes::new(0, block_size),
            write_buf_offset: 0,
            maybe_dirty: false,
            read_buf: AlignedBytes::new(0, block_size),
        }
    }

    pub fn capacity(&self) -> u64 {
        self.nvm.capacity()
    }

    pub fn block_size(&self) -> BlockSize {
        self.nvm.block_size()
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Moves the cursor to any position within the ring
    pub fn seek_to(&mut self, position: u64) -> Result<()> {
        if position > self.capacity() {
            return Err(LumpstoreError::invalid_input(format!(
                "journal position {} is beyond the ring capacity {}",
                position,
                self.capacity()
            )));
        }
        self.position = position;
        Ok(())
    }

    /// Writes staged bytes to the NVM without syncing
    pub fn flush_buffer(&mut self) -> Result<()> {
        if self.write_buf.is_empty() || !self.maybe_dirty {
            return Ok(());
        }

        self.nvm.seek(SeekFrom::Start(self.write_buf_offset))?;
        self.nvm.write(self.write_buf.as_bytes())?;

        // Keep the last block: the next append most likely lands in it
        let block = self.block_size().as_usize();
        let len = self.write_buf.len();
        if len > block {
            let dropped = len - block;
            self.write_buf.as_bytes_mut().copy_within(dropped.., 0);
            self.write_buf.truncate(block);
            self.write_buf_offset += dropped as u64;
        }
        self.maybe_dirty = false;
        Ok(())
    }

    /// Flushes staged bytes and syncs the NVM
    pub fn sync(&mut self) -> Result<()> {
        self.flush_buffer()?;
        self.nvm.sync()
    }

    fn is_dirty_range(&self, offset: u64, len: u64) -> bool {
        if !self.maybe_dirty || len == 0 || self.write_buf.is_empty() {
            return false;
        }
        let buf_start = self.write_buf_offset;
        let buf_end = buf_start + self.write_buf.len() as u64;
        offset < buf_end && buf_start < offset + len
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        if self.position + buf.len() as u64 > self.capacity() {
            invariant_violation(format!(
                "journal write of {} bytes at {} overruns the {}-byte ring",
                buf.len(),
                self.position,
                self.capacity()
            ));
        }

        let buf_start = self.write_buf_offset;
        let buf_end = buf_start + self.write_buf.len() as u64;
        if self.position < buf_start || buf_end < self.position {
            self.flush_buffer()?;
            let block_size = self.block_size();
            if block_size.is_aligned(self.position) {
                self.write_buf.align_resize(0);
                self.write_buf_offset = self.position;
            } else {
                self.write_buf_offset = block_size.floor_align(self.position);
                self.write_buf.align_resize(block_size.as_usize());
                self.nvm.seek(SeekFrom::Start(self.write_buf_offset))?;
                self.nvm.read(self.write_buf.as_bytes_mut())?;
            }
        }

        let start = (self.position - self.write_buf_offset) as usize;
        let end = start + buf.len();
        let new_len = cmp::max(self.write_buf.len(), end);
        self.write_buf.align_resize(new_len);
        self.write_buf.as_bytes_mut()[start..end].copy_from_slice(buf);

        self.position += buf.len() as u64;
        self.maybe_dirty = true;
        Ok(())
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        let capacity = self.capacity();
        if buf.is_empty() || self.position >= capacity {
            return Ok(0);
        }
        let end = cmp::min(self.position + buf.len() as u64, capacity);
        if self.is_dirty_range(self.position, end - self.position) {
            self.flush_buffer()?;
        }

        let block_size = self.block_size();
        let read_start = block_size.floor_align(self.position);
        let read_end = block_size.ceil_align(end);
        self.read_buf.align_resize((read_end - read_start) as usize);
        self.nvm.seek(SeekFrom::Start(read_start))?;
        self.nvm.read(self.read_buf.as_bytes_mut())?;

        let skip = (self.position - read_start) as usize;
        let len = (end - self.position) as usize;
        buf[..len].copy_from_slice(&self.read_buf.as_bytes()[skip..skip + len]);
        self.position = end;
        Ok(len)
    }
}

impl<N: NonVolatileMemory> Read for JournalNvmBuffer<N> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_bytes(buf)?)
    }
}

impl<N: NonVolatileMemory> Write for JournalNvmBuffer<N> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.flush_buffer()?)
    }
}

impl<N: NonVolatileMemory> Seek for JournalNvmBuffer<N> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => self.capacity().checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before the start of the ring")
        })?;
        self.seek_to(target)?;
        Ok(target)
    }
}
