//! Tests for allocate/release/restore
//!
//! These tests verify, for every backend:
//! - Best-fit selection with lowest start on ties
//! - Coalescing on release, bounded by the 24-bit length field
//! - Exhaustion and restore-from-index behavior
//! - Abort on double release

use lumpstore::address::Address;
use lumpstore::allocator::{BTreeAllocator, BitmapAllocator, DataPortionAllocator};
use lumpstore::portion::{DataPortion, FreePortion};
use lumpstore::{BlockSize, LumpstoreError};

use super::{fresh, KINDS};

// =============================================================================
// Helper Functions
// =============================================================================

fn portion(start: u32, len: u16) -> DataPortion {
    DataPortion { start: Address::from(start), len }
}

fn free(start: u32, len: u32) -> FreePortion {
    FreePortion::new(Address::from(start), len)
}

// =============================================================================
// Allocation Tests
// =============================================================================

#[test]
fn test_sequential_allocations_from_front() {
    for kind in KINDS {
        let mut allocator = fresh(kind, 100);
        assert_eq!(allocator.allocate(10).unwrap(), portion(0, 10), "{:?}", kind);
        assert_eq!(allocator.allocate(5).unwrap(), portion(10, 5), "{:?}", kind);
        assert_eq!(allocator.free_blocks(), 85);
        assert_eq!(allocator.free_portions(), vec![free(15, 85)]);
    }
}

#[test]
fn test_best_fit_prefers_smallest_run() {
    for kind in KINDS {
        let mut allocator = kind.build();
        // Free runs: [0, 5), [10, 30)
        allocator.restore_from_index(
            BlockSize::min(),
            100 * 512,
            vec![portion(5, 5), portion(30, 70)],
        );
        assert_eq!(allocator.free_portions(), vec![free(0, 5), free(10, 20)], "{:?}", kind);

        assert_eq!(allocator.allocate(6).unwrap(), portion(10, 6), "{:?}", kind);
        assert_eq!(allocator.allocate(4).unwrap(), portion(0, 4), "{:?}", kind);
        assert_eq!(allocator.allocate(1).unwrap(), portion(4, 1), "{:?}", kind);
    }
}

#[test]
fn test_ties_go_to_lowest_start() {
    for kind in KINDS {
        let mut allocator = kind.build();
        // Free runs of 3 blocks at 0, 10 and 20
        allocator.restore_from_index(
            BlockSize::min(),
            23 * 512,
            vec![portion(3, 7), portion(13, 7)],
        );
        assert_eq!(allocator.allocate(3).unwrap(), portion(0, 3), "{:?}", kind);
        assert_eq!(allocator.allocate(3).unwrap(), portion(10, 3), "{:?}", kind);
        assert_eq!(allocator.allocate(3).unwrap(), portion(20, 3), "{:?}", kind);
    }
}

#[test]
fn test_exhaustion_returns_storage_full() {
    for kind in KINDS {
        let mut allocator = fresh(kind, 100);
        allocator.allocate(60).unwrap();
        assert!(matches!(allocator.allocate(41), Err(LumpstoreError::StorageFull(_))));
        assert_eq!(allocator.allocate(40).unwrap(), portion(60, 40));
        assert!(matches!(allocator.allocate(1), Err(LumpstoreError::StorageFull(_))));
        assert_eq!(allocator.free_blocks(), 0);
        assert_eq!(allocator.max_free_run(), 0);
    }
}

#[test]
fn test_zero_block_allocation_is_rejected() {
    for kind in KINDS {
        let mut allocator = fresh(kind, 10);
        assert!(matches!(allocator.allocate(0), Err(LumpstoreError::InvalidInput(_))));
    }
}

// =============================================================================
// Release Tests
// =============================================================================

#[test]
fn test_release_coalesces_neighbours() {
    for kind in KINDS {
        let mut allocator = fresh(kind, 100);
        let a = allocator.allocate(10).unwrap();
        let b = allocator.allocate(10).unwrap();
        let c = allocator.allocate(10).unwrap();

        allocator.release(b);
        assert_eq!(allocator.free_portions(), vec![free(10, 10), free(30, 70)], "{:?}", kind);

        allocator.release(a);
        assert_eq!(allocator.free_portions(), vec![free(0, 20), free(30, 70)], "{:?}", kind);

        allocator.release(c);
        assert_eq!(allocator.free_portions(), vec![free(0, 100)], "{:?}", kind);
        assert_eq!(allocator.max_free_run(), 100);
    }
}

#[test]
fn test_max_free_run_tracks_largest() {
    for kind in KINDS {
        let mut allocator = fresh(kind, 100);
        let a = allocator.allocate(30).unwrap();
        allocator.allocate(10).unwrap();
        allocator.release(a);
        assert_eq!(allocator.max_free_run(), 60, "{:?}", kind);
        assert_eq!(allocator.free_blocks(), 90);
    }
}

#[test]
#[should_panic(expected = "invariant violation")]
fn test_btree_double_release_panics() {
    let mut allocator = BTreeAllocator::build(100);
    let p = allocator.allocate(5).unwrap();
    allocator.release(p);
    allocator.release(p);
}

#[test]
#[should_panic(expected = "invariant violation")]
fn test_bitmap_double_release_panics() {
    let mut allocator = BitmapAllocator::build(100);
    let p = allocator.allocate(5).unwrap();
    allocator.release(p);
    allocator.release(p);
}

#[test]
#[should_panic(expected = "invariant violation")]
fn test_btree_release_into_free_space_panics() {
    let mut allocator = BTreeAllocator::build(100);
    allocator.allocate(10).unwrap();
    allocator.release(portion(5, 10));
}

#[test]
#[should_panic(expected = "invariant violation")]
fn test_bitmap_release_into_free_space_panics() {
    let mut allocator = BitmapAllocator::build(100);
    allocator.allocate(10).unwrap();
    allocator.release(portion(5, 10));
}

// =============================================================================
// Length Limit Tests
// =============================================================================

#[test]
fn test_restore_splits_long_runs() {
    for kind in KINDS {
        let blocks = FreePortion::MAX_LEN as u64 + 10;
        let allocator = fresh(kind, blocks);
        assert_eq!(
            allocator.free_portions(),
            vec![free(0, 10), free(10, FreePortion::MAX_LEN)],
            "{:?}",
            kind
        );
        assert_eq!(allocator.free_blocks(), blocks);
    }
}

#[test]
fn test_release_does_not_merge_past_length_limit() {
    for kind in KINDS {
        let mut allocator = fresh(kind, FreePortion::MAX_LEN as u64 + 10);
        let p = allocator.allocate(10).unwrap();
        assert_eq!(p, portion(0, 10));

        allocator.release(p);
        assert_eq!(allocator.free_portions().len(), 2, "{:?}", kind);
        assert_eq!(allocator.free_blocks(), FreePortion::MAX_LEN as u64 + 10);
    }
}

// =============================================================================
// Restore Tests
// =============================================================================

#[test]
fn test_restore_replaces_previous_state() {
    for kind in KINDS {
        let mut allocator = fresh(kind, 50);
        allocator.allocate(20).unwrap();

        allocator.restore_from_index(BlockSize::min(), 50 * 512, vec![portion(40, 10)]);
        assert_eq!(allocator.free_portions(), vec![free(0, 40)], "{:?}", kind);
        assert_eq!(allocator.free_blocks(), 40);
    }
}

#[test]
fn test_restore_with_larger_block_size() {
    for kind in KINDS {
        let mut allocator = kind.build();
        let bs = BlockSize::new(4096).unwrap();
        allocator.restore_from_index(bs, 10 * 4096, vec![portion(2, 3)]);
        assert_eq!(allocator.free_portions(), vec![free(0, 2), free(5, 5)], "{:?}", kind);
    }
}

// =============================================================================
// Allocation Status Tests
// =============================================================================

#[test]
fn test_allocation_status_tracks_allocations() {
    for kind in KINDS {
        let mut allocator = fresh(kind, 1024);
        let single = allocator.allocate(1).unwrap();

        let status = allocator.allocation_status(8, 1024);
        assert_eq!(status.len(), 128, "{:?}", kind);
        assert_eq!(status[0], 0.125);
        assert!(status[1..].iter().all(|ratio| *ratio == 0.0));

        allocator.release(single);
        assert_eq!(allocator.allocation_status(8, 1024)[0], 0.0);

        allocator.allocate(1024).unwrap();
        assert_eq!(allocator.allocation_status(8, 1024), vec![1.0; 128]);
    }
}

#[test]
fn test_allocation_status_partial_last_point() {
    for kind in KINDS {
        let mut allocator = kind.build();
        allocator.restore_from_index(
            BlockSize::min(),
            20 * 512,
            vec![portion(0, 4), portion(16, 4)],
        );

        assert_eq!(allocator.allocation_status(8, 20), vec![0.5, 0.0, 1.0], "{:?}", kind);
        // Only the first 12 blocks are reported
        assert_eq!(allocator.allocation_status(8, 12), vec![0.5, 0.0], "{:?}", kind);
        assert!(allocator.allocation_status(0, 20).is_empty());
    }
}
