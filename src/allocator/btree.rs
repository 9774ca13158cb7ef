//! Ordered-set allocator backend
//!
//! Every free portion lives in two `BTreeSet`s:
//!
//! ```text
//! size_index: ordered by (len, start)  -> best-fit lookup
//! end_index:  ordered by end block     -> neighbour and overlap lookup
//! ```

use std::collections::BTreeSet;
use std::ops::Bound;

use super::{complement_of, occupancy_from_free, DataPortionAllocator};
use crate::address::Address;
use crate::block::BlockSize;
use crate::error::{invariant_violation, LumpstoreError, Result};
use crate::portion::{DataPortion, EndBasedPortion, FreePortion, SizeBasedPortion};

/// Allocator backed by two balanced-tree sets
#[derive(Debug, Default)]
pub struct BTreeAllocator {
    size_index: BTreeSet<SizeBasedPortion>,
    end_index: BTreeSet<EndBasedPortion>,
    free_blocks: u64,
}

impl BTreeAllocator {
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
        self.size_index.insert(SizeBasedPortion(portion));
        self.end_index.insert(EndBasedPortion(portion));
        self.free_blocks += portion.len() as u64;
    }

    fn delete_free_portion(&mut self, portion: FreePortion) {
        self.size_index.remove(&SizeBasedPortion(portion));
        self.end_index.remove(&EndBasedPortion(portion));
        self.free_blocks -= portion.len() as u64;
    }

    /// The free portion ending exactly at `end`, if any
    fn portion_ending_at(&self, end: u64) -> Option<FreePortion> {
        let key = EndBasedPortion(FreePortion::new(Address::from_u64(end).ok()?, 0));
        self.end_index.get(&key).map(|found| found.0)
    }

    /// The first free portion whose end lies strictly after `position`
    fn first_ending_after(&self, position: u64) -> Option<FreePortion> {
        let key = EndBasedPortion(FreePortion::new(Address::from_u64(position).ok()?, 0));
        self.end_index
            .range((Bound::Excluded(key), Bound::Unbounded))
            .next()
            .map(|found| found.0)
    }

    fn check_overlap(&self, released: FreePortion) {
        if let Some(next) = self.first_ending_after(released.start().as_u64()) {
            if next.start().as_u64() < released.end() {
                invariant_violation(format!(
                    "released portion {:?} overlaps free portion {:?}",
                    released, next
                ));
            }
        }
    }
}

impl DataPortionAllocator for BTreeAllocator {
    fn allocate(&mut self, size: u16) -> Result<DataPortion> {
        if size == 0 {
            return Err(LumpstoreError::invalid_input("cannot allocate zero blocks"));
        }
        let key = SizeBasedPortion(FreePortion::new(Address::default(), size as u32));
        let candidate = self.size_index.range(key..).next().map(|found| found.0);
        let Some(free) = candidate else {
            return Err(LumpstoreError::full(format!(
                "no free run of {} blocks in the data region",
                size
            )));
        };

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

        if let Some(prev) = self.portion_ending_at(released.start().as_u64()) {
            if let Some(merged) = prev.checked_extend(released.len()) {
                self.delete_free_portion(prev);
                released = merged;
            }
        }
        if let Some(next) = self.first_ending_after(released.end()) {
            if next.start().as_u64() == released.end() {
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
        self.size_index.clear();
        self.end_index.clear();
        self.free_blocks = 0;
        complement_of(block_size, capacity_bytes, occupied, |free| {
            self.add_free_portion(free)
        });
    }

    fn free_blocks(&self) -> u64 {
        self.free_blocks
    }

    fn max_free_run(&self) -> u32 {
        self.size_index.last().map_or(0, |largest| largest.0.len())
    }

    fn free_portions(&self) -> Vec<FreePortion> {
        self.end_index.iter().map(|entry| entry.0).collect()
    }

    fn allocation_status(&self, blocks_per_point: u64, total_blocks: u64) -> Vec<f64> {
        occupancy_from_free(self.end_index.iter().map(|entry| entry.0), blocks_per_point, total_blocks)
    }
}
