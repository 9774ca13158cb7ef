//! Compressed-bitmap allocator backend
//!
//! Free portions are stored as packed 64-bit keys in two roaring treemaps,
//! each sorted so that a plain numeric successor/predecessor query answers
//! one of the allocator's questions:
//!
//! ```text
//! start_keys: start << 24 | len    -> neighbours and overlap by position
//! size_keys:  len << 40   | start  -> best fit: first key >= size << 40
//! ```

use roaring::RoaringTreemap;

use super::{complement_of, occupancy_from_free, DataPortionAllocator};
use crate::address::Address;
use crate::block::BlockSize;
use crate::error::{invariant_violation, LumpstoreError, Result};
use crate::portion::{DataPortion, FreePortion};

const LEN_BITS: u32 = 24;
const LEN_MASK: u64 = (1 << LEN_BITS) - 1;
const START_MASK: u64 = (1 << 40) - 1;

/// Allocator backed by two roaring treemaps
#[derive(Debug, Default)]
pub struct BitmapAllocator {
    start_keys: RoaringTreemap,
    size_keys: RoaringTreemap,
    free_blocks: u64,
}

fn start_key(portion: FreePortion) -> u64 {
    (portion.start().as_u64() << LEN_BITS) | portion.len() as u64
}

fn from_start_key(key: u64) -> FreePortion {
    let start = Address::from_u64(key >> LEN_BITS).unwrap_or_default();
    FreePortion::new(start, (key & LEN_MASK) as u32)
}

/// The packed representation already sorts by (len, start)
fn size_key(portion: FreePortion) -> u64 {
    portion.as_u64()
}

fn from_size_key(key: u64) -> FreePortion {
    let start = Address::from_u64(key & START_MASK).unwrap_or_default();
    FreePortion::new(start, (key >> 40) as u32)
}

/// Smallest member `>= value`
fn successor(set: &RoaringTreemap, value: u64) -> Option<u64> {
    let below = if value == 0 { 0 } else { set.rank(value - 1) };
    set.select(below)
}

/// Largest member `< value`
fn predecessor(set: &RoaringTreemap, value: u64) -> Option<u64> {
    if value == 0 {
        return None;
    }
    match set.rank(value - 1) {
        0 => None,
        count => set.select(count - 1),
    }
}

impl BitmapAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// An allocator whose whole range of `capacity_blocks` is free
    pub fn build(capacity_blocks: u64) -> Self {
        let mut allocator = Self::new();
        complement_of(
            BlockSize::min(),
            capacity_blocks * BlockSize::min().as_u64(),
            Vec::new(),
            |free| allocator.add_free_portion(free),
        );
        allocator
    }

    fn add_free_portion(&mut self, portion: FreePortion) {
        self.start_keys.insert(start_key(portion));
        self.size_keys.insert(size_key(portion));
        self.free_blocks += portion.len() as u64;
    }

    fn delete_free_portion(&mut self, portion: FreePortion) {
        self.start_keys.remove(start_key(portion));
        self.size_keys.remove(size_key(portion));
        self.free_blocks -= portion.len() as u64;
    }

    fn check_overlap(&self, released: FreePortion) {
        // The free portion with the greatest start before `released.end()`
        // is the only candidate that can reach into `released`.
        let bound = released.end() << LEN_BITS;
        if let Some(key) = predecessor(&self.start_keys, bound) {
            let prev = from_start_key(key);
            if prev.end() > released.start().as_u64() {
                invariant_violation(format!(
                    "released portion {:?} overlaps free portion {:?}",
                    released, prev
                ));
            }
        }
    }
}

impl DataPortionAllocator for BitmapAllocator {
    fn allocate(&mut self, size: u16) -> Result<DataPortion> {
        if size == 0 {
            return Err(LumpstoreError::invalid_input("cannot allocate zero blocks"));
        }
        let Some(key) = successor(&self.size_keys, (size as u64) << 40) else {
            return Err(LumpstoreError::full(format!(
                "no free run of {} blocks in the data region",
                size
            )));
        };

        let free = from_size_key(key);
        self.delete_free_portion(free);
        let (rest, allocated) = free.slice_part(size);
        if !rest.is_empty() {
            self.add_free_portion(rest);
        }
        Ok(allocated)
    }

    fn release(&mut self, portion: DataPortion) {
        let mut released = FreePortion::from(portion);
        self.check_overlap(released);

        let start = released.start().as_u64();
        if let Some(key) = predecessor(&self.start_keys, start << LEN_BITS) {
            let prev = from_start_key(key);
            if prev.end() == start {
                if let Some(merged) = prev.checked_extend(released.len()) {
                    self.delete_free_portion(prev);
                    released = merged;
                }
            }
        }

        let end = released.end();
        if let Some(key) = successor(&self.start_keys, end << LEN_BITS) {
            let next = from_start_key(key);
            if next.start().as_u64() == end {
                if let Some(merged) = released.checked_extend(next.len()) {
                    self.delete_free_portion(next);
                    released = merged;
                }
            }
        }
        self.add_free_portion(released);
    }

    fn restore_from_index(
        &mut self,
        block_size: BlockSize,
        capacity_bytes: u64,
        occupied: Vec<DataPortion>,
    ) {
        self.start_keys.clear();
        self.size_keys.clear();
        self.free_blocks = 0;
        complement_of(block_size, capacity_bytes, occupied, |free| {
            self.add_free_portion(free)
        });
    }

    fn free_blocks(&self) -> u64 {
        self.free_blocks
    }

    fn max_free_run(&self) -> u32 {
        self.size_keys.max().map_or(0, |key| from_size_key(key).len())
    }

    fn free_portions(&self) -> Vec<FreePortion> {
        self.start_keys.iter().map(from_start_key).collect()
    }

    fn allocation_status(&self, blocks_per_point: u64, total_blocks: u64) -> Vec<f64> {
        occupancy_from_free(self.start_keys.iter().map(from_start_key), blocks_per_point, total_blocks)
    }
}
