//! Storage Module
//!
//! The façade that turns the regions into a lump store.
//!
//! ## File layout
//! ```text
//! ┌──────────────┬──────────────────────────┬──────────────────────────────┐
//! │ header       │ journal region           │ data region                  │
//! │ (1 block)    │ (header block + ring)    │ (allocator-managed blocks)   │
//! └──────────────┴──────────────────────────┴──────────────────────────────┘
//! ```
//!
//! ## Write path
//! - small payloads: one `Embed` record in the journal, nothing else
//! - large payloads: data region first, then a `Put` record pointing at it
//! - deletes: a `Delete` record, then the old data blocks are released
//!
//! A `Storage` is single-threaded: every operation takes `&mut self` and
//! callers serialize access themselves. Durability extends to the last
//! successful `sync` (or the periodic sync performed every
//! `sync_interval` appends).

mod data_region;

pub use data_region::DataRegion;

use std::io::SeekFrom;
use std::ops::Range;
use std::path::Path;

use crate::block::AlignedBytes;
use crate::config::Config;
use crate::error::{LumpstoreError, Result};
use crate::index::LumpIndex;
use crate::journal::{JournalRegion, JournalSnapshot};
use crate::lump::{LumpData, LumpId, MAX_EMBEDDED_SIZE};
use crate::nvm::{FileNvm, NonVolatileMemory, StorageHeader};
use crate::portion::{FreePortion, Portion};

/// Bytes summarized by one `allocation_status` point
pub const STATUS_POINT_BYTES: u64 = 4 << 20;

/// Cap on the number of `allocation_status` points
pub const MAX_STATUS_POINTS: u64 = 12800;

/// Space accounting for a storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageUsage {
    pub lump_count: u64,
    pub data_capacity: u64,
    pub data_free_bytes: u64,
    pub data_max_segment_bytes: u64,
    pub journal_capacity: u64,
    pub journal_usage_bytes: u64,
}

/// An open lump storage
pub struct Storage<N: NonVolatileMemory> {
    header: StorageHeader,
    journal_region: JournalRegion<N>,
    data_region: DataRegion<N>,
    lump_index: LumpIndex,
    config: Config,
}

impl<N: NonVolatileMemory> Storage<N> {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Formats `nvm` as an empty storage and opens it
    pub fn create(mut nvm: N, config: Config) -> Result<Self> {
        config.validate()?;
        if !config.block_size.contains(nvm.block_size()) {
            return Err(LumpstoreError::invalid_input(format!(
                "block size {} is not a multiple of the device block size {}",
                config.block_size,
                nvm.block_size()
            )));
        }

        // Step 1: Lay out the regions
        let header =
            StorageHeader::for_capacity(nvm.capacity(), config.block_size, config.journal_ratio)?;

        // Step 2: Header region, journal header block and an empty ring in one write
        let mut initial = Vec::new();
        header.write_region_to(&mut initial)?;
        JournalRegion::<N>::initialize(&mut initial, nvm.block_size())?;
        let mut initial = AlignedBytes::from_bytes(&initial, nvm.block_size());
        initial.align();
        nvm.seek(SeekFrom::Start(0))?;
        nvm.write(initial.as_bytes())?;
        nvm.sync()?;

        tracing::info!(
            "Created storage {}: journal={} bytes, data={} bytes, block_size={}",
            header.instance_uuid,
            header.journal_region_size,
            header.data_region_size,
            header.block_size
        );

        // Step 3: Open it like any other storage
        Self::open(nvm, config)
    }

    /// Opens an existing storage
    ///
    /// On startup:
    /// 1. Read and validate the header
    /// 2. Split the device into journal and data regions
    /// 3. Replay the journal into a fresh index
    /// 4. Rebuild the allocator from the live data portions
    pub fn open(mut nvm: N, config: Config) -> Result<Self> {
        config.validate()?;

        // Step 1: Header
        let header = StorageHeader::read_from_nvm(&mut nvm)?;
        if !header.block_size.contains(nvm.block_size()) {
            return Err(LumpstoreError::invalid_input(format!(
                "storage block size {} is not a multiple of the device block size {}",
                header.block_size,
                nvm.block_size()
            )));
        }
        if header.storage_size() > nvm.capacity() {
            return Err(LumpstoreError::invalid_input(format!(
                "header describes {} bytes but the device only has {}",
                header.storage_size(),
                nvm.capacity()
            )));
        }

        // Step 2: Regions
        let (journal_nvm, data_nvm) = header.split_regions(nvm)?;

        // Step 3: Journal replay
        let mut journal_region = JournalRegion::open(journal_nvm, config.journal_options())?;
        let mut lump_index = LumpIndex::new();
        journal_region.restore_index(&mut lump_index)?;

        // Step 4: Allocator
        let mut allocator = config.allocator.build();
        allocator.restore_from_index(
            header.block_size,
            header.data_region_size,
            lump_index.data_portions(),
        );
        let data_region = DataRegion::new(allocator, data_nvm, header.block_size);

        tracing::info!(
            "Opened storage {}: {} lumps, {} free data bytes",
            header.instance_uuid,
            lump_index.len(),
            data_region.free_bytes()
        );

        Ok(Storage {
            header,
            journal_region,
            data_region,
            lump_index,
            config,
        })
    }

    /// Syncs and releases the storage
    pub fn close(mut self) -> Result<()> {
        self.sync()?;
        tracing::info!("Closed storage {}", self.header.instance_uuid);
        Ok(())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Stores `data` under `lump_id`, returning whether the id already existed
    ///
    /// Payloads created with `LumpData::new_embedded`, or no larger than the
    /// configured embed threshold, are embedded in the journal.
    pub fn put(&mut self, lump_id: LumpId, data: LumpData) -> Result<bool> {
        let embed = data.is_embedded() || data.len() <= self.config.embed_threshold;
        let previous = if embed {
            self.put_journal(lump_id, data.into_vec())?
        } else {
            self.put_data_region(lump_id, data)?
        };
        self.release_data_portion(previous);
        Ok(previous.is_some())
    }

    /// Stores `data` embedded in the journal regardless of the threshold
    pub fn put_embed(&mut self, lump_id: LumpId, data: &[u8]) -> Result<bool> {
        if data.len() > MAX_EMBEDDED_SIZE {
            return Err(LumpstoreError::invalid_input(format!(
                "embedded lump of {} bytes exceeds the maximum of {}",
                data.len(),
                MAX_EMBEDDED_SIZE
            )));
        }
        let previous = self.put_journal(lump_id, data.to_vec())?;
        self.release_data_portion(previous);
        Ok(previous.is_some())
    }

    fn put_journal(&mut self, lump_id: LumpId, data: Vec<u8>) -> Result<Option<Portion>> {
        let previous = self.lump_index.get(&lump_id);
        self.journal_region
            .record_embed(&mut self.lump_index, lump_id, data)
            .inspect_err(|_| self.release_if_replaced(lump_id, previous))
    }

    fn put_data_region(&mut self, lump_id: LumpId, data: LumpData) -> Result<Option<Portion>> {
        let previous = self.lump_index.get(&lump_id);
        let portion = self
            .data_region
            .put(data.into_aligned(self.header.block_size))?;

        match self
            .journal_region
            .record_put(&mut self.lump_index, lump_id, portion)
        {
            Ok(previous) => Ok(previous),
            Err(e) => {
                if self.lump_index.get(&lump_id) == Some(Portion::Data(portion)) {
                    self.release_data_portion(previous);
                } else {
                    self.data_region.release(portion);
                }
                Err(e)
            }
        }
    }

    /// Removes `lump_id`, returning whether it existed
    pub fn delete(&mut self, lump_id: LumpId) -> Result<bool> {
        if !self.lump_index.contains(&lump_id) {
            return Ok(false);
        }
        let previous = self.lump_index.get(&lump_id);
        let previous = self
            .journal_region
            .record_delete(&mut self.lump_index, lump_id)
            .inspect_err(|_| self.release_if_replaced(lump_id, previous))?;
        self.release_data_portion(previous);
        Ok(previous.is_some())
    }

    /// Removes every id in `range` with a single journal record
    ///
    /// Returns the removed ids in ascending order.
    pub fn delete_range(&mut self, range: Range<LumpId>) -> Result<Vec<LumpId>> {
        let covered: Vec<(LumpId, Portion)> = self
            .lump_index
            .list_range(range.clone(), usize::MAX)
            .into_iter()
            .filter_map(|id| self.lump_index.get(&id).map(|portion| (id, portion)))
            .collect();
        let removed = self
            .journal_region
            .record_delete_range(&mut self.lump_index, range)
            .inspect_err(|_| {
                for (id, portion) in &covered {
                    self.release_if_replaced(*id, Some(*portion));
                }
            })?;
        let mut ids = Vec::with_capacity(removed.len());
        for (id, portion) in removed {
            self.release_data_portion(Some(portion));
            ids.push(id);
        }
        Ok(ids)
    }

    /// After a failed journal call: if the record landed anyway (only the
    /// follow-up GC or sync failed), `previous` is unreachable and is freed.
    fn release_if_replaced(&mut self, lump_id: LumpId, previous: Option<Portion>) {
        if self.lump_index.get(&lump_id) != previous {
            self.release_data_portion(previous);
        }
    }

    fn release_data_portion(&mut self, portion: Option<Portion>) {
        if let Some(Portion::Data(portion)) = portion {
            self.data_region.release(portion);
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    fn portion_of(&self, lump_id: LumpId) -> Result<Portion> {
        self.lump_index
            .get(&lump_id)
            .ok_or(LumpstoreError::LumpNotFound(lump_id))
    }

    /// Reads the whole payload of `lump_id`
    pub fn get(&mut self, lump_id: LumpId) -> Result<LumpData> {
        match self.portion_of(lump_id)? {
            Portion::Journal(portion) => {
                let data = self.journal_region.get_embedded_data(portion)?;
                LumpData::new_embedded(data)
            }
            Portion::Data(portion) => self.data_region.get(portion),
        }
    }

    /// Reads `length` bytes of the payload starting at `offset`
    pub fn get_with_offset(&mut self, lump_id: LumpId, offset: usize, length: usize) -> Result<Vec<u8>> {
        match self.portion_of(lump_id)? {
            Portion::Journal(portion) => {
                let end = offset.checked_add(length).unwrap_or(usize::MAX);
                if end > portion.len as usize {
                    return Err(LumpstoreError::invalid_input(format!(
                        "range {}..{} exceeds the {}-byte lump",
                        offset, end, portion.len
                    )));
                }
                let data = self.journal_region.get_embedded_data(portion)?;
                Ok(data[offset..end].to_vec())
            }
            Portion::Data(portion) => self.data_region.get_with_offset(portion, offset, length),
        }
    }

    /// Payload length of `lump_id`
    pub fn get_size(&mut self, lump_id: LumpId) -> Result<usize> {
        match self.portion_of(lump_id)? {
            Portion::Journal(portion) => Ok(portion.len as usize),
            Portion::Data(portion) => self.data_region.get_size(portion),
        }
    }

    /// Bytes the lump occupies on disk (whole blocks for the data region)
    pub fn get_size_on_disk(&self, lump_id: LumpId) -> Result<u64> {
        Ok(self
            .portion_of(lump_id)?
            .len_on_disk(self.header.block_size))
    }

    pub fn contains(&self, lump_id: LumpId) -> bool {
        self.lump_index.contains(&lump_id)
    }

    /// All ids in ascending order
    pub fn list(&self) -> Vec<LumpId> {
        self.lump_index.list()
    }

    /// Ids in `range`, ascending, at most `max` of them
    pub fn list_range(&self, range: Range<LumpId>, max: usize) -> Vec<LumpId> {
        self.lump_index.list_range(range, max)
    }

    /// Smallest stored id at or after `from`
    pub fn first(&self, from: LumpId) -> Option<LumpId> {
        self.lump_index.first(from)
    }

    /// An id that is not in use: one past the largest id, or the lowest
    /// gap once the largest possible id is taken. `None` when every id is.
    pub fn next_free_id(&self) -> Option<LumpId> {
        match self.lump_index.max() {
            None => Some(LumpId::new(0)),
            Some(max) => match max.as_u128().checked_add(1) {
                Some(next) => Some(LumpId::new(next)),
                None => self.lump_index.first_empty(),
            },
        }
    }

    pub fn min_id(&self) -> Option<LumpId> {
        self.lump_index.min()
    }

    pub fn max_id(&self) -> Option<LumpId> {
        self.lump_index.max()
    }

    pub fn len(&self) -> usize {
        self.lump_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lump_index.is_empty()
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Makes every completed operation durable
    pub fn sync(&mut self) -> Result<()> {
        self.journal_region.sync()?;
        self.data_region.sync()
    }

    /// Writes staged journal records to the device without syncing it
    ///
    /// Flushed records survive a process crash but not a power loss.
    pub fn flush(&mut self) -> Result<()> {
        self.journal_region.flush()
    }

    /// Runs journal GC over every record live at the time of the call
    pub fn journal_gc(&mut self) -> Result<()> {
        self.journal_region.gc_all_entries(&mut self.lump_index)
    }

    /// Incremental journal maintenance for idle periods
    pub fn run_side_job_once(&mut self) -> Result<()> {
        self.journal_region.run_side_job_once(&mut self.lump_index)
    }

    pub fn set_automatic_gc_mode(&mut self, enabled: bool) {
        self.journal_region.set_automatic_gc_mode(enabled);
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn header(&self) -> &StorageHeader {
        &self.header
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn usage(&self) -> StorageUsage {
        StorageUsage {
            lump_count: self.lump_index.len() as u64,
            data_capacity: self.header.data_region_size,
            data_free_bytes: self.data_region.free_bytes(),
            data_max_segment_bytes: self.data_region.max_free_run_bytes(),
            journal_capacity: self.journal_region.capacity(),
            journal_usage_bytes: self.journal_region.usage(),
        }
    }

    pub fn journal_snapshot(&mut self) -> Result<JournalSnapshot> {
        self.journal_region.snapshot()
    }

    /// Occupancy of the data region, one ratio in `[0, 1]` per 4 MiB
    ///
    /// Covers at most the first `MAX_STATUS_POINTS` points. Empty when a
    /// single block is larger than a point.
    pub fn allocation_status(&self) -> Vec<f64> {
        let block = self.header.block_size.as_u64();
        let blocks_per_point = STATUS_POINT_BYTES / block;
        if blocks_per_point == 0 {
            return Vec::new();
        }
        let total_blocks =
            (self.header.data_region_size / block).min(MAX_STATUS_POINTS * blocks_per_point);
        self.data_region
            .allocation_status(blocks_per_point, total_blocks)
    }

    /// Allocator free set, ordered by start block
    pub fn free_portions(&self) -> Vec<FreePortion> {
        self.data_region.free_portions()
    }
}

impl Storage<FileNvm> {
    /// Creates a new storage file of `capacity` bytes (rounded up to a block)
    pub fn create_file(path: impl AsRef<Path>, capacity: u64, config: Config) -> Result<Self> {
        config.validate()?;
        let capacity = config.block_size.ceil_align(capacity);
        let nvm = FileNvm::create(path, capacity, config.block_size, config.direct_io)?;
        Self::create(nvm, config)
    }

    /// Opens an existing storage file
    pub fn open_file(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        let nvm = FileNvm::open(path, config.direct_io)?;
        Self::open(nvm, config)
    }
}
