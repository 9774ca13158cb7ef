//! Journal header block
//!
//! One block in front of the ring holding the persisted head:
//!
//! ```text
//! ┌───────────────┬──────────────────────────┐
//! │ head: u64 BE  │ zero padding to a block  │
//! └───────────────┴──────────────────────────┘
//! ```

use std::io::SeekFrom;

use bytes::{Buf, BufMut};

use crate::block::AlignedBytes;
use crate::error::Result;
use crate::nvm::NonVolatileMemory;

#[derive(Debug)]
pub struct JournalHeaderRegion<N> {
    nvm: N,
    block: AlignedBytes,
}

impl<N: NonVolatileMemory> JournalHeaderRegion<N> {
    pub fn new(nvm: N) -> Self {
        let block_size = nvm.block_size();
        JournalHeaderRegion {
            nvm,
            block: AlignedBytes::new(block_size.as_usize(), block_size),
        }
    }

    /// Durably records `head`
    pub fn write_head(&mut self, head: u64) -> Result<()> {
        let bytes = self.block.as_bytes_mut();
        bytes.fill(0);
        (&mut bytes[..8]).put_u64(head);
        self.nvm.seek(SeekFrom::Start(0))?;
        self.nvm.write(self.block.as_bytes())?;
        self.nvm.sync()
    }

    pub fn read_head(&mut self) -> Result<u64> {
        self.nvm.seek(SeekFrom::Start(0))?;
        self.nvm.read(self.block.as_bytes_mut())?;
        Ok((&self.block.as_bytes()[..8]).get_u64())
    }
}
