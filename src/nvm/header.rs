//! Storage header
//!
//! ## On-disk format (big-endian, at offset 0)
//!
//! ```text
//! ┌──────────┬─────────────┬───────┬───────┬────────────┬──────────┬─────────────┬─────────────┐
//! │ "lusf"   │ header_size │ major │ minor │ block_size │ uuid     │ journal_len │ data_len    │
//! │ 4 bytes  │ u16         │ u16   │ u16   │ u16        │ 16 bytes │ u64         │ u64         │
//! └──────────┴─────────────┴───────┴───────┴────────────┴──────────┴─────────────┴─────────────┘
//!                           └──────────────────── header_size bytes ─────────────────────────┘
//! ```
//! The header is zero-padded to a block boundary; the journal region follows
//! immediately, then the data region.

use std::io::{SeekFrom, Write};

use bytes::{Buf, BufMut};
use uuid::Uuid;

use super::NonVolatileMemory;
use crate::address::MAX_ADDRESS;
use crate::block::{AlignedBytes, BlockSize};
use crate::error::{LumpstoreError, Result};

// =============================================================================
// Constants
// =============================================================================

pub const MAGIC_NUMBER: [u8; 4] = *b"lusf";

pub const MAJOR_VERSION: u16 = 1;
pub const MINOR_VERSION: u16 = 1;

/// Bytes following the `header_size` field
pub const HEADER_SIZE: u16 = 2 + 2 + 2 + 16 + 8 + 8;

/// Magic + size field + body
pub const FULL_HEADER_SIZE: u16 = 4 + 2 + HEADER_SIZE;

pub const MAX_JOURNAL_REGION_SIZE: u64 = MAX_ADDRESS;
pub const MAX_DATA_REGION_SIZE: u64 = MAX_JOURNAL_REGION_SIZE * BlockSize::MIN as u64;

// =============================================================================
// StorageHeader
// =============================================================================

/// Fixed description of a storage file's layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageHeader {
    pub major_version: u16,
    pub minor_version: u16,
    pub block_size: BlockSize,
    pub instance_uuid: Uuid,
    pub journal_region_size: u64,
    pub data_region_size: u64,
}

impl StorageHeader {
    /// Header for a new storage, with a fresh instance id
    pub fn new(block_size: BlockSize, journal_region_size: u64, data_region_size: u64) -> Self {
        StorageHeader {
            major_version: MAJOR_VERSION,
            minor_version: MINOR_VERSION,
            block_size,
            instance_uuid: Uuid::new_v4(),
            journal_region_size,
            data_region_size,
        }
    }

    /// Lays out a storage of `capacity` bytes
    ///
    /// The journal gets `journal_ratio` of the capacity (at least two blocks:
    /// its header block plus one ring block); the data region gets the
    /// block-aligned rest.
    pub fn for_capacity(capacity: u64, block_size: BlockSize, journal_ratio: f64) -> Result<Self> {
        let bs = block_size.as_u64();
        let header_region = block_size.ceil_align(FULL_HEADER_SIZE as u64);
        if capacity < header_region + 3 * bs {
            return Err(LumpstoreError::invalid_input(format!(
                "capacity {} is too small: at least {} bytes are needed",
                capacity,
                header_region + 3 * bs
            )));
        }

        let requested = (capacity as f64 * journal_ratio).ceil() as u64;
        let journal_region_size = block_size.ceil_align(requested).max(2 * bs);
        if journal_region_size > MAX_JOURNAL_REGION_SIZE {
            return Err(LumpstoreError::invalid_input(format!(
                "journal region of {} bytes exceeds the maximum of {}",
                journal_region_size, MAX_JOURNAL_REGION_SIZE
            )));
        }

        let rest = capacity
            .checked_sub(header_region + journal_region_size)
            .unwrap_or(0);
        let data_region_size = block_size.floor_align(rest);
        if data_region_size < bs {
            return Err(LumpstoreError::invalid_input(format!(
                "journal ratio {} leaves no room for the data region",
                journal_ratio
            )));
        }
        if data_region_size > MAX_DATA_REGION_SIZE {
            return Err(LumpstoreError::invalid_input(format!(
                "data region of {} bytes exceeds the maximum of {}",
                data_region_size, MAX_DATA_REGION_SIZE
            )));
        }

        Ok(StorageHeader::new(block_size, journal_region_size, data_region_size))
    }

    /// Size of the padded header region
    pub fn region_size(&self) -> u64 {
        self.block_size.ceil_align(FULL_HEADER_SIZE as u64)
    }

    /// Header region + journal region + data region
    pub fn storage_size(&self) -> u64 {
        self.region_size() + self.journal_region_size + self.data_region_size
    }

    // =========================================================================
    // Encoding
    // =========================================================================

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(&MAGIC_NUMBER);
        buf.put_u16(HEADER_SIZE);
        buf.put_u16(self.major_version);
        buf.put_u16(self.minor_version);
        buf.put_u16(self.block_size.as_u16());
        buf.put_slice(self.instance_uuid.as_bytes());
        buf.put_u64(self.journal_region_size);
        buf.put_u64(self.data_region_size);
    }

    /// Writes the header zero-padded to `region_size()` bytes
    pub fn write_region_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut buf = Vec::with_capacity(self.region_size() as usize);
        self.encode(&mut buf);
        buf.resize(self.region_size() as usize, 0);
        writer.write_all(&buf)?;
        Ok(())
    }

    pub fn decode(mut bytes: &[u8]) -> Result<Self> {
        if bytes.remaining() < MAGIC_NUMBER.len() + 2 {
            return Err(LumpstoreError::corrupted("storage header is truncated"));
        }
        let mut magic = [0; 4];
        bytes.copy_to_slice(&mut magic);
        if magic != MAGIC_NUMBER {
            return Err(LumpstoreError::invalid_input(format!(
                "unknown magic number {:?}",
                magic
            )));
        }

        let header_size = bytes.get_u16();
        if header_size < HEADER_SIZE {
            return Err(LumpstoreError::invalid_input(format!(
                "header size {} is smaller than {}",
                header_size, HEADER_SIZE
            )));
        }
        if header_size > HEADER_SIZE {
            return Err(LumpstoreError::corrupted(format!(
                "header declares {} bytes but only {} are defined",
                header_size, HEADER_SIZE
            )));
        }
        if bytes.remaining() < header_size as usize {
            return Err(LumpstoreError::corrupted("storage header is truncated"));
        }

        let major_version = bytes.get_u16();
        if major_version != MAJOR_VERSION {
            return Err(LumpstoreError::invalid_input(format!(
                "unsupported major version {} (expected {})",
                major_version, MAJOR_VERSION
            )));
        }
        let minor_version = bytes.get_u16();
        if minor_version > MINOR_VERSION {
            return Err(LumpstoreError::invalid_input(format!(
                "unsupported minor version {} (newest known is {})",
                minor_version, MINOR_VERSION
            )));
        }

        let block_size = BlockSize::new(bytes.get_u16())?;

        let mut uuid = [0; 16];
        bytes.copy_to_slice(&mut uuid);

        let journal_region_size = bytes.get_u64();
        if journal_region_size > MAX_JOURNAL_REGION_SIZE {
            return Err(LumpstoreError::invalid_input(format!(
                "journal region size {} exceeds {}",
                journal_region_size, MAX_JOURNAL_REGION_SIZE
            )));
        }
        let data_region_size = bytes.get_u64();
        if data_region_size > MAX_DATA_REGION_SIZE {
            return Err(LumpstoreError::invalid_input(format!(
                "data region size {} exceeds {}",
                data_region_size, MAX_DATA_REGION_SIZE
            )));
        }

        Ok(StorageHeader {
            major_version,
            minor_version,
            block_size,
            instance_uuid: Uuid::from_bytes(uuid),
            journal_region_size,
            data_region_size,
        })
    }

    /// Reads and decodes the header at offset 0 of `nvm`
    pub fn read_from_nvm<N: NonVolatileMemory>(nvm: &mut N) -> Result<Self> {
        let block_size = nvm.block_size();
        let len = block_size.ceil_align(FULL_HEADER_SIZE as u64) as usize;
        let mut buf = AlignedBytes::new(len, block_size);
        nvm.seek(SeekFrom::Start(0))?;
        nvm.read(buf.as_bytes_mut())?;
        Self::decode(buf.as_bytes())
    }

    /// Splits a whole-device view into `(journal, data)` views
    pub fn split_regions<N: NonVolatileMemory>(&self, nvm: N) -> Result<(N, N)> {
        let (_header, body) = nvm.split(self.region_size())?;
        let (journal, rest) = body.split(self.journal_region_size)?;
        let (data, _slack) = rest.split(self.data_region_size)?;
        Ok((journal, data))
    }
}
