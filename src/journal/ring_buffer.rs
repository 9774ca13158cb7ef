//! Journal ring buffer
//!
//! ```text
//!  0                                                        capacity
//!  ├──────────┬─────────────────┬──────────────────┬──────────────┤
//!  │ reusable │ popped, not yet │ live records     │ reusable     │
//!  │          │ released        │                  │              │
//!  └──────────┴─────────────────┴──────────────────┴──────────────┘
//!             ▲                 ▲                  ▲
//!      unreleased_head         head               tail (EndOfRecords)
//! ```
//!
//! - `tail` always points at an `EndOfRecords` sentinel, so a forward scan
//!   from `head` stops exactly there after a restart
//! - a record that would cross the physical end is preceded by a
//!   `GoToFront` marker and written at offset 0 instead
//! - space before `unreleased_head` is only reused once the journal header
//!   has durably recorded a newer head

use std::io::{BufReader, Read, Seek, SeekFrom};

use super::nvm_buffer::JournalNvmBuffer;
use super::record::{JournalEntry, JournalRecord, EMBEDDED_DATA_OFFSET, END_OF_RECORDS_SIZE};
use crate::address::Address;
use crate::block::BlockSize;
use crate::error::{LumpstoreError, Result};
use crate::nvm::NonVolatileMemory;
use crate::portion::JournalPortion;

/// Upper bound on the read-ahead used when scanning records
const SCAN_BUFFER_SIZE: usize = 1024 * 1024;

/// Read-ahead budgeted per requested record for bounded scans
const SCAN_BYTES_PER_RECORD: usize = 64;

/// Circular log of journal records over an NVM view
#[derive(Debug)]
pub struct JournalRingBuffer<N> {
    nvm: JournalNvmBuffer<N>,
    unreleased_head: u64,
    head: u64,
    tail: u64,
}

impl<N: NonVolatileMemory> JournalRingBuffer<N> {
    /// Opens the ring with `head` as both the oldest live and oldest
    /// unreleased record; `tail` is unknown until `restore_entries` runs.
    pub fn new(nvm: N, head: u64) -> Self {
        JournalRingBuffer {
            nvm: JournalNvmBuffer::new(nvm),
            unreleased_head: head,
            head,
            tail: head,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn head(&self) -> u64 {
        self.head
    }

    pub fn tail(&self) -> u64 {
        self.tail
    }

    pub fn unreleased_head(&self) -> u64 {
        self.unreleased_head
    }

    pub fn capacity(&self) -> u64 {
        self.nvm.capacity()
    }

    pub fn block_size(&self) -> BlockSize {
        self.nvm.block_size()
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Bytes between `unreleased_head` and `tail`, accounting for wraparound
    pub fn usage(&self) -> u64 {
        if self.unreleased_head <= self.tail {
            self.tail - self.unreleased_head
        } else {
            self.tail + self.capacity() - self.unreleased_head
        }
    }

    // =========================================================================
    // Appending
    // =========================================================================

    /// Appends `record` at the tail
    ///
    /// Returns the location of the embedded payload for `Embed` records.
    /// Fails with `StorageFull` when the record (plus the sentinel that
    /// follows it) does not fit in front of `unreleased_head`.
    pub fn enqueue(&mut self, record: &JournalRecord) -> Result<Option<JournalPortion>> {
        let wraps = self.check_free_space(record)?;
        let start = if wraps { 0 } else { self.tail };
        self.nvm.seek_to(start)?;
        record.write_to(&mut self.nvm)?;
        JournalRecord::EndOfRecords.write_to(&mut self.nvm)?;
        if wraps {
            // Offset 0 must hold the new sentinel on disk before the marker
            // can lead a replay there; otherwise it finds last lap's records.
            self.nvm.sync()?;
            self.nvm.seek_to(self.tail)?;
            JournalRecord::GoToFront.write_to(&mut self.nvm)?;
        }
        self.tail = start + record.external_size();
        tracing::trace!(
            "Journal append tag={} at {} (tail={})",
            record.tag(),
            start,
            self.tail
        );

        match record {
            JournalRecord::Embed { data, .. } => Ok(Some(JournalPortion {
                start: Address::from_u64(start + EMBEDDED_DATA_OFFSET)?,
                len: data.len() as u16,
            })),
            _ => Ok(None),
        }
    }

    /// Returns whether the record must wrap to offset 0, or `StorageFull`
    fn check_free_space(&self, record: &JournalRecord) -> Result<bool> {
        let needed = record.external_size() + END_OF_RECORDS_SIZE;
        let capacity = self.capacity();
        let block_size = self.block_size();

        let fits = if self.tail + needed > capacity {
            // Wrapping is only possible while the free space runs up to the
            // physical end, i.e. the live region does not already wrap.
            let wraps_ok = self.tail >= self.unreleased_head
                && block_size.ceil_align(needed) <= self.unreleased_head;
            if wraps_ok {
                return Ok(true);
            }
            false
        } else {
            let write_end = block_size.ceil_align(self.tail + needed);
            let free_end = if self.tail < self.unreleased_head {
                self.unreleased_head
            } else {
                capacity + self.unreleased_head
            };
            write_end <= free_end
        };

        if fits {
            Ok(false)
        } else {
            Err(LumpstoreError::full(format!(
                "journal ring cannot take a {}-byte record (tail={}, unreleased_head={}, capacity={})",
                record.external_size(),
                self.tail,
                self.unreleased_head,
                capacity
            )))
        }
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Pops the record at `head`, or `None` at the end of the live records
    pub fn pop_front(&mut self) -> Result<Option<JournalEntry>> {
        Ok(self.dequeue_entries(1)?.pop())
    }

    /// Pops up to `limit` records from `head`
    pub fn dequeue_entries(&mut self, limit: usize) -> Result<Vec<JournalEntry>> {
        let mut entries = Vec::new();
        self.head = self.scan(self.head, limit, |entry| {
            entries.push(entry);
            Ok(())
        })?;
        Ok(entries)
    }

    /// Replays every record from `head`, leaving `tail` on the sentinel
    ///
    /// Used once at open time; returns the number of records visited.
    pub fn restore_entries<F>(&mut self, mut visit: F) -> Result<u64>
    where
        F: FnMut(JournalEntry) -> Result<()>,
    {
        let mut count = 0;
        self.tail = self.scan(self.head, usize::MAX, |entry| {
            count += 1;
            visit(entry)
        })?;
        Ok(count)
    }

    /// Live records from `head` to `tail`, without consuming them
    pub fn entries(&mut self) -> Result<Vec<JournalEntry>> {
        let mut entries = Vec::new();
        self.scan(self.head, usize::MAX, |entry| {
            entries.push(entry);
            Ok(())
        })?;
        Ok(entries)
    }

    /// Walks records starting at `from`, following `GoToFront` and stopping
    /// at `EndOfRecords` or after `limit` records. Returns the position just
    /// past the last visited record (or the sentinel position).
    fn scan<F>(&mut self, from: u64, limit: usize, mut visit: F) -> Result<u64>
    where
        F: FnMut(JournalEntry) -> Result<()>,
    {
        let buffer_size = self.scan_buffer_size(limit);
        let mut reader = BufReader::with_capacity(buffer_size, &mut self.nvm);
        reader.seek(SeekFrom::Start(from))?;

        let mut position = from;
        let mut wrapped = false;
        let mut visited = 0;
        while visited < limit {
            match JournalRecord::read_from(&mut reader)? {
                JournalRecord::EndOfRecords => break,
                JournalRecord::GoToFront => {
                    if wrapped {
                        return Err(LumpstoreError::corrupted(
                            "journal ring wraps twice without reaching its tail",
                        ));
                    }
                    wrapped = true;
                    position = 0;
                    reader.seek(SeekFrom::Start(0))?;
                }
                record => {
                    let entry = JournalEntry {
                        start: Address::from_u64(position)?,
                        record,
                    };
                    position = entry.end();
                    visit(entry)?;
                    visited += 1;
                }
            }
        }
        Ok(position)
    }

    /// Read-ahead for a scan of at most `limit` records
    ///
    /// Larger records are still read whole; the buffer only sets how much is
    /// fetched per device read.
    fn scan_buffer_size(&self, limit: usize) -> usize {
        let block = self.block_size().as_usize();
        limit
            .saturating_mul(SCAN_BYTES_PER_RECORD)
            .clamp(block, SCAN_BUFFER_SIZE)
            .min(self.capacity() as usize)
            .max(1)
    }

    /// Reads `portion.len` embedded bytes
    pub fn read_embedded(&mut self, portion: JournalPortion) -> Result<Vec<u8>> {
        let mut data = vec![0; portion.len as usize];
        self.nvm.seek_to(portion.start.as_u64())?;
        self.nvm.read_exact(&mut data).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                LumpstoreError::corrupted("embedded lump runs past the end of the ring")
            } else {
                e.into()
            }
        })?;
        Ok(data)
    }

    // =========================================================================
    // Space management
    // =========================================================================

    /// Allows everything before `head` to be overwritten
    ///
    /// Must only be called once `head` is durably recorded.
    pub fn release_bytes_until(&mut self, head: u64) {
        self.unreleased_head = head;
    }

    /// Writes staged bytes to the NVM
    pub fn flush(&mut self) -> Result<()> {
        self.nvm.flush_buffer()
    }

    pub fn sync(&mut self) -> Result<()> {
        self.nvm.sync()
    }
}
