//! Journal record codec
//!
//! ## Record Format (big-endian)
//!
//! ```text
//! ┌──────────────┬────────┬──────────────────────────────┐
//! │ checksum u32 │ tag u8 │ payload (depends on tag)     │
//! └──────────────┴────────┴──────────────────────────────┘
//!
//! EndOfRecords (0) / GoToFront (1):  (none)
//! Put (3):          lump_id[16] data_offset:u40 data_len:u16
//! Embed (4):        lump_id[16] len:u16 bytes[len]
//! Delete (5):       lump_id[16]
//! DeleteRange (6):  start_id[16] end_id[16]
//! ```
//!
//! The checksum is Adler-32 over the tag byte followed by the payload.

use std::io::{self, Read, Write};
use std::ops::Range;

use adler32::RollingAdler32;
use bytes::{Buf, BufMut, BytesMut};

use crate::address::Address;
use crate::error::{LumpstoreError, Result};
use crate::lump::{LumpId, MAX_EMBEDDED_SIZE};
use crate::portion::DataPortion;

// =============================================================================
// Constants
// =============================================================================

pub const TAG_END_OF_RECORDS: u8 = 0;
pub const TAG_GO_TO_FRONT: u8 = 1;
pub const TAG_PUT: u8 = 3;
pub const TAG_EMBED: u8 = 4;
pub const TAG_DELETE: u8 = 5;
pub const TAG_DELETE_RANGE: u8 = 6;

/// Checksum + tag
pub const RECORD_HEADER_SIZE: u64 = 4 + 1;

/// Size of the `EndOfRecords` sentinel that follows every append
pub const END_OF_RECORDS_SIZE: u64 = RECORD_HEADER_SIZE;

const LUMP_ID_SIZE: u64 = LumpId::SIZE as u64;
const LENGTH_SIZE: u64 = 2;
const PORTION_OFFSET_SIZE: usize = 5;

/// Distance from the start of an `Embed` record to its payload bytes
pub const EMBEDDED_DATA_OFFSET: u64 = RECORD_HEADER_SIZE + LUMP_ID_SIZE + LENGTH_SIZE;

// =============================================================================
// JournalRecord
// =============================================================================

/// One entry of the journal ring
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalRecord {
    /// Sentinel marking the live tail
    EndOfRecords,
    /// The rest of the ring is unused; continue at offset 0
    GoToFront,
    Put { lump_id: LumpId, portion: DataPortion },
    Embed { lump_id: LumpId, data: Vec<u8> },
    Delete { lump_id: LumpId },
    DeleteRange { range: Range<LumpId> },
}

impl JournalRecord {
    pub fn tag(&self) -> u8 {
        match self {
            JournalRecord::EndOfRecords => TAG_END_OF_RECORDS,
            JournalRecord::GoToFront => TAG_GO_TO_FRONT,
            JournalRecord::Put { .. } => TAG_PUT,
            JournalRecord::Embed { .. } => TAG_EMBED,
            JournalRecord::Delete { .. } => TAG_DELETE,
            JournalRecord::DeleteRange { .. } => TAG_DELETE_RANGE,
        }
    }

    /// Bytes the record occupies in the ring
    pub fn external_size(&self) -> u64 {
        let payload = match self {
            JournalRecord::EndOfRecords | JournalRecord::GoToFront => 0,
            JournalRecord::Put { .. } => {
                LUMP_ID_SIZE + PORTION_OFFSET_SIZE as u64 + LENGTH_SIZE
            }
            JournalRecord::Embed { data, .. } => LUMP_ID_SIZE + LENGTH_SIZE + data.len() as u64,
            JournalRecord::Delete { .. } => LUMP_ID_SIZE,
            JournalRecord::DeleteRange { .. } => LUMP_ID_SIZE * 2,
        };
        RECORD_HEADER_SIZE + payload
    }

    pub fn is_control(&self) -> bool {
        matches!(self, JournalRecord::EndOfRecords | JournalRecord::GoToFront)
    }

    fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            JournalRecord::EndOfRecords | JournalRecord::GoToFront => {}
            JournalRecord::Put { lump_id, portion } => {
                buf.put_u128(lump_id.as_u128());
                buf.put_uint(portion.start.as_u64(), PORTION_OFFSET_SIZE);
                buf.put_u16(portion.len);
            }
            JournalRecord::Embed { lump_id, data } => {
                if data.len() > MAX_EMBEDDED_SIZE {
                    return Err(LumpstoreError::invalid_input(format!(
                        "embedded payload of {} bytes exceeds {}",
                        data.len(),
                        MAX_EMBEDDED_SIZE
                    )));
                }
                buf.put_u128(lump_id.as_u128());
                buf.put_u16(data.len() as u16);
                buf.put_slice(data);
            }
            JournalRecord::Delete { lump_id } => {
                buf.put_u128(lump_id.as_u128());
            }
            JournalRecord::DeleteRange { range } => {
                buf.put_u128(range.start.as_u128());
                buf.put_u128(range.end.as_u128());
            }
        }
        Ok(())
    }

    /// Encodes the full record, checksum included
    pub fn encode(&self) -> Result<BytesMut> {
        let mut body = BytesMut::with_capacity(self.external_size() as usize);
        body.put_u8(self.tag());
        self.encode_payload(&mut body)?;

        let mut record = BytesMut::with_capacity(body.len() + 4);
        record.put_u32(checksum(&body));
        record.extend_from_slice(&body);
        Ok(record)
    }

    /// Writes the encoded record in a single `write_all`
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let record = self.encode()?;
        writer.write_all(&record)?;
        Ok(())
    }

    /// Reads and verifies one record
    ///
    /// Unknown tags, truncated payloads and checksum mismatches are all
    /// reported as `StorageCorrupted`.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut header = [0; RECORD_HEADER_SIZE as usize];
        read_exact_or_corrupted(reader, &mut header)?;
        let mut header_buf = &header[..];
        let expected = header_buf.get_u32();
        let tag = header_buf.get_u8();

        let fixed_len = match tag {
            TAG_END_OF_RECORDS | TAG_GO_TO_FRONT => 0,
            TAG_PUT => LUMP_ID_SIZE as usize + PORTION_OFFSET_SIZE + LENGTH_SIZE as usize,
            TAG_EMBED => LUMP_ID_SIZE as usize + LENGTH_SIZE as usize,
            TAG_DELETE => LUMP_ID_SIZE as usize,
            TAG_DELETE_RANGE => LUMP_ID_SIZE as usize * 2,
            unknown => {
                return Err(LumpstoreError::corrupted(format!(
                    "unknown journal record tag {}",
                    unknown
                )))
            }
        };

        let mut body = Vec::with_capacity(1 + fixed_len);
        body.push(tag);
        body.resize(1 + fixed_len, 0);
        read_exact_or_corrupted(reader, &mut body[1..])?;

        if tag == TAG_EMBED {
            let data_len = u16::from_be_bytes([body[1 + 16], body[1 + 17]]) as usize;
            let fixed_end = body.len();
            body.resize(fixed_end + data_len, 0);
            read_exact_or_corrupted(reader, &mut body[fixed_end..])?;
        }

        let actual = checksum(&body);
        if actual != expected {
            return Err(LumpstoreError::corrupted(format!(
                "journal record checksum mismatch: expected {:#010x}, computed {:#010x}",
                expected, actual
            )));
        }

        let mut payload = &body[1..];
        let record = match tag {
            TAG_END_OF_RECORDS => JournalRecord::EndOfRecords,
            TAG_GO_TO_FRONT => JournalRecord::GoToFront,
            TAG_PUT => {
                let lump_id = LumpId::new(payload.get_u128());
                let start = Address::from_u64(payload.get_uint(PORTION_OFFSET_SIZE))?;
                let len = payload.get_u16();
                JournalRecord::Put {
                    lump_id,
                    portion: DataPortion { start, len },
                }
            }
            TAG_EMBED => {
                let lump_id = LumpId::new(payload.get_u128());
                let _len = payload.get_u16();
                JournalRecord::Embed {
                    lump_id,
                    data: payload.to_vec(),
                }
            }
            TAG_DELETE => JournalRecord::Delete {
                lump_id: LumpId::new(payload.get_u128()),
            },
            _ => {
                let start = LumpId::new(payload.get_u128());
                let end = LumpId::new(payload.get_u128());
                JournalRecord::DeleteRange { range: start..end }
            }
        };
        Ok(record)
    }
}

/// Adler-32 over `bytes`
fn checksum(bytes: &[u8]) -> u32 {
    let mut adler = RollingAdler32::new();
    adler.update_buffer(bytes);
    adler.hash()
}

fn read_exact_or_corrupted<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            LumpstoreError::corrupted("journal record is truncated")
        } else {
            e.into()
        }
    })
}

// =============================================================================
// JournalEntry
// =============================================================================

/// A record together with its offset in the ring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub start: Address,
    pub record: JournalRecord,
}

impl JournalEntry {
    /// Offset just past the record
    pub fn end(&self) -> u64 {
        self.start.as_u64() + self.record.external_size()
    }
}
