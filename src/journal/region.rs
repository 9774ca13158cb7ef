//! Journal region: header block + ring, plus index replay and GC
//!
//! ## Garbage collection
//! Ring space is reclaimed by moving the durable head forward. Records at
//! the head are popped in batches into `gc_queue`; each one is either
//! garbage (superseded according to the index) and dropped, or still live
//! and re-appended at the tail. Once a batch is processed, the next refill
//! persists the new head and releases the space behind it.
//!
//! ```text
//!   append ──► enqueue ──► update index ──► gc_once? ──► periodic sync
//!                                             │
//!                      queue empty && usage > threshold
//!                                             ▼
//!                 sync ring, persist head, pop batch into gc_queue
//! ```

use std::collections::VecDeque;
use std::io::Write;
use std::ops::Range;

use super::header_region::JournalHeaderRegion;
use super::record::{JournalEntry, JournalRecord, EMBEDDED_DATA_OFFSET};
use super::ring_buffer::JournalRingBuffer;
use super::JournalSnapshot;
use crate::address::Address;
use crate::block::BlockSize;
use crate::error::{invariant_violation, LumpstoreError, Result};
use crate::index::LumpIndex;
use crate::lump::LumpId;
use crate::nvm::NonVolatileMemory;
use crate::portion::{DataPortion, JournalPortion, Portion};

// =============================================================================
// Options
// =============================================================================

/// Tuning knobs for journal GC and syncing
#[derive(Debug, Clone, Copy)]
pub struct JournalOptions {
    /// Records moved into the GC queue per refill
    pub gc_queue_size: usize,

    /// Ring usage fraction above which per-append GC refills the queue
    pub gc_usage_ratio: f64,

    /// GC steps performed by one `run_side_job_once`
    pub side_job_gc_count: usize,

    /// Appends between implicit syncs
    pub sync_interval: usize,

    /// Run one GC step after every append
    pub automatic_gc: bool,
}

impl Default for JournalOptions {
    fn default() -> Self {
        Self {
            gc_queue_size: 64,
            gc_usage_ratio: 0.5,
            side_job_gc_count: 64,
            sync_interval: 0x2000,
            automatic_gc: true,
        }
    }
}

// =============================================================================
// JournalRegion
// =============================================================================

/// The write-ahead journal of a storage
#[derive(Debug)]
pub struct JournalRegion<N> {
    header_region: JournalHeaderRegion<N>,
    ring: JournalRingBuffer<N>,
    gc_queue: VecDeque<JournalEntry>,
    sync_countdown: usize,
    options: JournalOptions,
}

impl<N: NonVolatileMemory> JournalRegion<N> {
    /// Writes the initial contents of an empty journal region: a header
    /// block with `head = 0` followed by a ring block starting with
    /// `EndOfRecords`.
    pub fn initialize<W: Write>(writer: &mut W, block_size: BlockSize) -> Result<()> {
        let block = block_size.as_usize();
        let mut bytes = vec![0; block * 2];
        bytes[..8].copy_from_slice(&0u64.to_be_bytes());
        let sentinel = JournalRecord::EndOfRecords.encode()?;
        bytes[block..block + sentinel.len()].copy_from_slice(&sentinel);
        writer.write_all(&bytes)?;
        Ok(())
    }

    /// Opens the journal stored in `nvm`
    ///
    /// The ring is not usable until `restore_index` has located its tail.
    pub fn open(nvm: N, options: JournalOptions) -> Result<Self> {
        let block_size = nvm.block_size();
        let (header_nvm, ring_nvm) = nvm.split(block_size.as_u64())?;

        let mut header_region = JournalHeaderRegion::new(header_nvm);
        let head = header_region.read_head()?;
        if head >= ring_nvm.capacity() {
            return Err(LumpstoreError::corrupted(format!(
                "persisted journal head {} is outside the {}-byte ring",
                head,
                ring_nvm.capacity()
            )));
        }

        Ok(JournalRegion {
            header_region,
            ring: JournalRingBuffer::new(ring_nvm, head),
            gc_queue: VecDeque::new(),
            sync_countdown: options.sync_interval,
            options,
        })
    }

    /// Replays the ring from the persisted head into `index`
    ///
    /// Any corrupted record aborts the replay.
    pub fn restore_index(&mut self, index: &mut LumpIndex) -> Result<u64> {
        let restored = self.ring.restore_entries(|entry| {
            match entry.record {
                JournalRecord::Put { lump_id, portion } => {
                    index.insert(lump_id, Portion::Data(portion));
                }
                JournalRecord::Embed { lump_id, data } => {
                    let portion = embedded_portion(entry.start, data.len())?;
                    index.insert(lump_id, Portion::Journal(portion));
                }
                JournalRecord::Delete { lump_id } => {
                    index.remove(&lump_id);
                }
                JournalRecord::DeleteRange { range } => {
                    index.remove_range(range);
                }
                JournalRecord::EndOfRecords | JournalRecord::GoToFront => {
                    invariant_violation("control record surfaced during journal replay")
                }
            }
            Ok(())
        })?;

        tracing::info!(
            "Journal restored: {} records, head={}, tail={}, {} lumps indexed",
            restored,
            self.ring.head(),
            self.ring.tail(),
            index.len()
        );
        Ok(restored)
    }

    // =========================================================================
    // Recording mutations
    // =========================================================================

    /// Journals a data-region put and points the index at `portion`
    ///
    /// Returns the portion the id previously mapped to.
    pub fn record_put(
        &mut self,
        index: &mut LumpIndex,
        lump_id: LumpId,
        portion: DataPortion,
    ) -> Result<Option<Portion>> {
        self.append(index, &JournalRecord::Put { lump_id, portion })?;
        let previous = index.insert(lump_id, Portion::Data(portion));
        self.after_append(index)?;
        Ok(previous)
    }

    /// Journals an embedded put; the index is updated to the ring location
    pub fn record_embed(
        &mut self,
        index: &mut LumpIndex,
        lump_id: LumpId,
        data: Vec<u8>,
    ) -> Result<Option<Portion>> {
        let previous = index.get(&lump_id);
        self.append(index, &JournalRecord::Embed { lump_id, data })?;
        self.after_append(index)?;
        Ok(previous)
    }

    pub fn record_delete(&mut self, index: &mut LumpIndex, lump_id: LumpId) -> Result<Option<Portion>> {
        self.append(index, &JournalRecord::Delete { lump_id })?;
        let previous = index.remove(&lump_id);
        self.after_append(index)?;
        Ok(previous)
    }

    /// Journals a single `DeleteRange` record and drops the range from the index
    pub fn record_delete_range(
        &mut self,
        index: &mut LumpIndex,
        range: Range<LumpId>,
    ) -> Result<Vec<(LumpId, Portion)>> {
        self.append(index, &JournalRecord::DeleteRange { range: range.clone() })?;
        let removed = index.remove_range(range);
        self.after_append(index)?;
        Ok(removed)
    }

    fn append(&mut self, index: &mut LumpIndex, record: &JournalRecord) -> Result<()> {
        let embedded = self.ring.enqueue(record)?;
        if let (JournalRecord::Embed { lump_id, .. }, Some(portion)) = (record, embedded) {
            index.insert(*lump_id, Portion::Journal(portion));
        }
        Ok(())
    }

    fn after_append(&mut self, index: &mut LumpIndex) -> Result<()> {
        if self.options.automatic_gc {
            self.gc_once(index)?;
        }
        self.try_sync()
    }

    // =========================================================================
    // Reading
    // =========================================================================

    pub fn get_embedded_data(&mut self, portion: JournalPortion) -> Result<Vec<u8>> {
        self.ring.read_embedded(portion)
    }

    // =========================================================================
    // Garbage collection
    // =========================================================================

    /// One GC step: refill the queue if needed, then drop garbage entries
    /// until one live entry has been moved to the tail.
    pub fn gc_once(&mut self, index: &mut LumpIndex) -> Result<()> {
        if self.gc_queue.is_empty() && self.needs_gc() {
            self.fill_gc_queue()?;
        }

        while let Some(entry) = self.gc_queue.pop_front() {
            if is_garbage(index, &entry) {
                continue;
            }
            match self.append(index, &entry.record) {
                Ok(()) => break,
                Err(LumpstoreError::StorageFull(reason)) => {
                    self.gc_queue.push_front(entry);
                    // Space behind the queue front may still be unreleased
                    if self.release_processed_entries()? {
                        continue;
                    }
                    tracing::warn!("Journal GC stalled, ring is full of live records: {}", reason);
                    break;
                }
                Err(e) => {
                    self.gc_queue.push_front(entry);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Processes every record that was live when the call started
    pub fn gc_all_entries(&mut self, index: &mut LumpIndex) -> Result<()> {
        let tail = self.ring.tail();
        loop {
            let before = self.ring.head();
            if self.gc_queue.is_empty() {
                self.fill_gc_queue()?;
            }
            while !self.gc_queue.is_empty() {
                let queued = self.gc_queue.len();
                self.gc_once(index)?;
                if self.gc_queue.len() == queued {
                    // Blocked on a full ring
                    return Err(LumpstoreError::full(
                        "journal GC cannot relocate live records: ring is full",
                    ));
                }
            }
            if has_passed(before, tail, self.ring.head()) {
                break;
            }
        }

        self.ring.sync()?;
        let head = self.ring.head();
        self.write_journal_header(head)?;
        tracing::debug!(
            "Journal full GC done: head={}, tail={}, usage={}",
            head,
            self.ring.tail(),
            self.ring.usage()
        );
        Ok(())
    }

    /// Idle-time maintenance, meant to be called periodically
    pub fn run_side_job_once(&mut self, index: &mut LumpIndex) -> Result<()> {
        if self.gc_queue.is_empty() {
            self.fill_gc_queue()
        } else if self.sync_countdown != self.options.sync_interval {
            self.sync()
        } else {
            for _ in 0..self.options.side_job_gc_count {
                self.gc_once(index)?;
            }
            self.try_sync()
        }
    }

    /// Persists the queue front as the head; returns whether space was freed
    fn release_processed_entries(&mut self) -> Result<bool> {
        let before = self.ring.unreleased_head();
        self.sync()?;
        Ok(self.ring.unreleased_head() != before)
    }

    fn needs_gc(&self) -> bool {
        self.ring.usage() as f64 > self.ring.capacity() as f64 * self.options.gc_usage_ratio
    }

    fn fill_gc_queue(&mut self) -> Result<()> {
        if self.ring.is_empty() {
            return Ok(());
        }
        // Records re-appended by the previous batch must be durable before
        // the head moves past their originals.
        self.ring.sync()?;
        let head = self.ring.head();
        self.write_journal_header(head)?;

        let entries = self.ring.dequeue_entries(self.options.gc_queue_size)?;
        tracing::debug!(
            "Journal GC queued {} records (head {} -> {}, tail={})",
            entries.len(),
            head,
            self.ring.head(),
            self.ring.tail()
        );
        self.gc_queue.extend(entries);
        Ok(())
    }

    fn write_journal_header(&mut self, head: u64) -> Result<()> {
        self.header_region.write_head(head)?;
        self.ring.release_bytes_until(head);
        Ok(())
    }

    // =========================================================================
    // Durability
    // =========================================================================

    /// Pushes staged records to the device without waiting for durability
    pub fn flush(&mut self) -> Result<()> {
        self.ring.flush()
    }

    /// Syncs the ring and persists the oldest head still needed for replay
    pub fn sync(&mut self) -> Result<()> {
        self.ring.sync()?;
        let head = self
            .gc_queue
            .front()
            .map_or(self.ring.head(), |entry| entry.start.as_u64());
        if head != self.ring.unreleased_head() {
            self.write_journal_header(head)?;
        }
        self.sync_countdown = self.options.sync_interval;
        Ok(())
    }

    fn try_sync(&mut self) -> Result<()> {
        if self.sync_countdown == 0 {
            self.sync()
        } else {
            self.sync_countdown -= 1;
            Ok(())
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn set_automatic_gc_mode(&mut self, enabled: bool) {
        self.options.automatic_gc = enabled;
    }

    pub fn options(&self) -> &JournalOptions {
        &self.options
    }

    /// Ring capacity in bytes (excluding the header block)
    pub fn capacity(&self) -> u64 {
        self.ring.capacity()
    }

    pub fn usage(&self) -> u64 {
        self.ring.usage()
    }

    pub fn gc_queue_len(&self) -> usize {
        self.gc_queue.len()
    }

    /// Ring positions plus every live record from head to tail
    pub fn snapshot(&mut self) -> Result<JournalSnapshot> {
        Ok(JournalSnapshot {
            unreleased_head: self.ring.unreleased_head(),
            head: self.ring.head(),
            tail: self.ring.tail(),
            entries: self.ring.entries()?,
        })
    }
}

/// Where the payload of an `Embed` record starting at `record_start` lives
fn embedded_portion(record_start: Address, len: usize) -> Result<JournalPortion> {
    Ok(JournalPortion {
        start: record_start.checked_add_u64(EMBEDDED_DATA_OFFSET)?,
        len: len as u16,
    })
}

/// Whether `entry` no longer contributes to the index
fn is_garbage(index: &LumpIndex, entry: &JournalEntry) -> bool {
    match &entry.record {
        JournalRecord::Put { lump_id, portion } => index.get(lump_id) != Some(Portion::Data(*portion)),
        JournalRecord::Embed { lump_id, data } => match index.get(lump_id) {
            Some(Portion::Journal(current)) => {
                let here = embedded_portion(entry.start, data.len()).ok();
                here != Some(current)
            }
            _ => true,
        },
        _ => true,
    }
}

/// Whether moving from `before` to `after` crossed `target`, on a ring
fn has_passed(before: u64, target: u64, after: u64) -> bool {
    if before <= after {
        before <= target && target <= after
    } else {
        before <= target || target <= after
    }
}
