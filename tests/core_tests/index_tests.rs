//! Tests for LumpIndex

use lumpstore::address::Address;
use lumpstore::index::LumpIndex;
use lumpstore::portion::{DataPortion, JournalPortion, Portion};
use lumpstore::LumpId;

// =============================================================================
// Helper Functions
// =============================================================================

fn id(n: u128) -> LumpId {
    LumpId::new(n)
}

fn data(start: u32, len: u16) -> Portion {
    Portion::Data(DataPortion { start: Address::from(start), len })
}

fn embedded(start: u32, len: u16) -> Portion {
    Portion::Journal(JournalPortion { start: Address::from(start), len })
}

fn populated() -> LumpIndex {
    let mut index = LumpIndex::new();
    for n in [5u128, 1, 9, 3, 7] {
        index.insert(id(n), data(n as u32 * 10, 1));
    }
    index
}

// =============================================================================
// Basic Tests
// =============================================================================

#[test]
fn test_insert_get_remove() {
    let mut index = LumpIndex::new();
    assert!(index.is_empty());

    assert_eq!(index.insert(id(1), embedded(23, 3)), None);
    assert_eq!(index.get(&id(1)), Some(embedded(23, 3)));
    assert!(index.contains(&id(1)));

    assert_eq!(index.insert(id(1), data(4, 2)), Some(embedded(23, 3)));
    assert_eq!(index.remove(&id(1)), Some(data(4, 2)));
    assert_eq!(index.remove(&id(1)), None);
    assert!(index.is_empty());
}

#[test]
fn test_list_is_ascending() {
    let index = populated();
    assert_eq!(index.list(), vec![id(1), id(3), id(5), id(7), id(9)]);
    assert_eq!(index.min(), Some(id(1)));
    assert_eq!(index.max(), Some(id(9)));
    assert_eq!(index.len(), 5);
}

#[test]
fn test_list_range_bounds_and_limit() {
    let index = populated();
    assert_eq!(index.list_range(id(3)..id(9), 10), vec![id(3), id(5), id(7)]);
    assert_eq!(index.list_range(id(0)..id(100), 2), vec![id(1), id(3)]);
    assert!(index.list_range(id(9)..id(3), 10).is_empty());
}

// =============================================================================
// Range Removal Tests
// =============================================================================

#[test]
fn test_remove_range_returns_removed_entries() {
    let mut index = populated();
    let removed = index.remove_range(id(3)..id(8));

    let ids: Vec<_> = removed.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![id(3), id(5), id(7)]);
    assert_eq!(removed[0].1, data(30, 1));
    assert_eq!(index.list(), vec![id(1), id(9)]);
}

#[test]
fn test_remove_empty_range() {
    let mut index = populated();
    assert!(index.remove_range(id(5)..id(5)).is_empty());
    assert!(index.remove_range(id(8)..id(2)).is_empty());
    assert_eq!(index.len(), 5);
}

#[test]
fn test_data_portions_skip_embedded() {
    let mut index = LumpIndex::new();
    index.insert(id(1), data(0, 2));
    index.insert(id(2), embedded(50, 10));
    index.insert(id(3), data(8, 1));

    let portions = index.data_portions();
    assert_eq!(portions.len(), 2);
    assert!(portions.contains(&DataPortion { start: Address::from(0u32), len: 2 }));
    assert!(portions.contains(&DataPortion { start: Address::from(8u32), len: 1 }));
}

// =============================================================================
// Id Lookup Tests
// =============================================================================

#[test]
fn test_first_at_or_after() {
    let index = populated();
    assert_eq!(index.first(id(0)), Some(id(1)));
    assert_eq!(index.first(id(5)), Some(id(5)));
    assert_eq!(index.first(id(6)), Some(id(7)));
    assert_eq!(index.first(id(10)), None);
    assert_eq!(LumpIndex::new().first(id(0)), None);
}

#[test]
fn test_first_empty() {
    let mut index = LumpIndex::new();
    assert_eq!(index.first_empty(), Some(id(0)));

    for n in 0..4u128 {
        index.insert(id(n), data(n as u32, 1));
    }
    assert_eq!(index.first_empty(), Some(id(4)));

    index.remove(&id(2));
    index.insert(id(u128::MAX), data(100, 1));
    assert_eq!(index.first_empty(), Some(id(2)));
}
