//! Allocator Module
//!
//! Free-space management for the data region.
//!
//! ## Contract
//! - `allocate(n)` returns the smallest free run of at least `n` blocks
//!   (lowest start on ties), handing out its prefix
//! - `release(p)` returns a portion, merging with free neighbours whenever
//!   the merged length still fits the 24-bit length field
//! - releasing a range that overlaps free space aborts: it means some other
//!   bookkeeping already went wrong
//!
//! Two backends implement the contract with identical observable behavior:
//! [`BTreeAllocator`] (ordered sets) and [`BitmapAllocator`] (compressed
//! bitmaps over packed keys).

mod bitmap;
mod btree;

pub use bitmap::BitmapAllocator;
pub use btree::BTreeAllocator;

use crate::address::Address;
use crate::block::BlockSize;
use crate::error::Result;
use crate::portion::{DataPortion, FreePortion};

/// Free-space manager for the data region
pub trait DataPortionAllocator: Send {
    /// Allocates `size` contiguous blocks, or fails with `StorageFull`
    fn allocate(&mut self, size: u16) -> Result<DataPortion>;

    /// Returns blocks to the free set; aborts if they overlap free space
    fn release(&mut self, portion: DataPortion);

    /// Replaces the free set with the complement of `occupied` within
    /// `capacity_bytes`, splitting runs longer than `FreePortion::MAX_LEN`.
    fn restore_from_index(
        &mut self,
        block_size: BlockSize,
        capacity_bytes: u64,
        occupied: Vec<DataPortion>,
    );

    /// Total free blocks
    fn free_blocks(&self) -> u64;

    /// Length of the largest free run, in blocks
    fn max_free_run(&self) -> u32;

    /// Free portions ordered by start block
    fn free_portions(&self) -> Vec<FreePortion>;

    /// Fraction of allocated blocks in each consecutive group of
    /// `blocks_per_point` blocks, over the first `total_blocks` blocks.
    /// A trailing partial group is measured against its own width.
    fn allocation_status(&self, blocks_per_point: u64, total_blocks: u64) -> Vec<f64>;
}

/// Which allocator backend a storage uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocatorKind {
    BTree,
    #[default]
    Bitmap,
}

impl AllocatorKind {
    /// An empty allocator of this kind; call `restore_from_index` before use
    pub fn build(self) -> Box<dyn DataPortionAllocator> {
        match self {
            AllocatorKind::BTree => Box::new(BTreeAllocator::new()),
            AllocatorKind::Bitmap => Box::new(BitmapAllocator::new()),
        }
    }
}

/// Walks the gaps between `occupied` portions from the end of the region
/// backward, yielding free runs no longer than `FreePortion::MAX_LEN`.
pub(crate) fn complement_of(
    block_size: BlockSize,
    capacity_bytes: u64,
    mut occupied: Vec<DataPortion>,
    mut add: impl FnMut(FreePortion),
) {
    occupied.sort_by_key(|portion| std::cmp::Reverse(portion.end()));

    let mut tail = capacity_bytes / block_size.as_u64();
    let mut fill_down_to = |floor: u64, tail: &mut u64| {
        while floor < *tail {
            let len = (*tail - floor).min(FreePortion::MAX_LEN as u64);
            *tail -= len;
            let start = Address::from_u64(*tail).unwrap_or_default();
            add(FreePortion::new(start, len as u32));
        }
    };

    for portion in &occupied {
        fill_down_to(portion.end(), &mut tail);
        tail = tail.min(portion.start.as_u64());
    }
    fill_down_to(0, &mut tail);
}

/// Buckets free runs (in start order) into per-point occupancy ratios
pub(crate) fn occupancy_from_free(
    free: impl Iterator<Item = FreePortion>,
    blocks_per_point: u64,
    total_blocks: u64,
) -> Vec<f64> {
    if blocks_per_point == 0 || total_blocks == 0 {
        return Vec::new();
    }
    let points = total_blocks.div_ceil(blocks_per_point) as usize;
    let mut free_per_point = vec![0u64; points];

    for portion in free {
        let end = portion.end().min(total_blocks);
        let mut cursor = portion.start().as_u64();
        if cursor >= total_blocks {
            break;
        }
        while cursor < end {
            let point = cursor / blocks_per_point;
            let point_end = ((point + 1) * blocks_per_point).min(end);
            free_per_point[point as usize] += point_end - cursor;
            cursor = point_end;
        }
    }

    free_per_point
        .iter()
        .enumerate()
        .map(|(point, free)| {
            let first = point as u64 * blocks_per_point;
            let width = (total_blocks - first).min(blocks_per_point);
            1.0 - *free as f64 / width as f64
        })
        .collect()
}
