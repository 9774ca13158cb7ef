//! Lump index
//!
//! In-memory ordered map from `LumpId` to the lump's current `Portion`.
//! It has no durable state of its own: it is rebuilt from journal replay
//! at open time. Values are kept in their packed 64-bit form.

use std::collections::BTreeMap;
use std::ops::Range;

use crate::lump::LumpId;
use crate::portion::{DataPortion, Portion};

/// Ordered map from lump id to its location
#[derive(Debug, Default, Clone)]
pub struct LumpIndex {
    map: BTreeMap<LumpId, u64>,
}

impl LumpIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &LumpId) -> Option<Portion> {
        self.map.get(id).copied().map(Portion::from_packed)
    }

    pub fn contains(&self, id: &LumpId) -> bool {
        self.map.contains_key(id)
    }

    /// Inserts or overwrites, returning the previous portion
    pub fn insert(&mut self, id: LumpId, portion: Portion) -> Option<Portion> {
        self.map
            .insert(id, portion.to_packed())
            .map(Portion::from_packed)
    }

    pub fn remove(&mut self, id: &LumpId) -> Option<Portion> {
        self.map.remove(id).map(Portion::from_packed)
    }

    /// Removes every id in `range`, returning the removed entries in id order
    pub fn remove_range(&mut self, range: Range<LumpId>) -> Vec<(LumpId, Portion)> {
        if range.start >= range.end {
            return Vec::new();
        }
        let mut removed = self.map.split_off(&range.start);
        let mut after = removed.split_off(&range.end);
        self.map.append(&mut after);
        removed
            .into_iter()
            .map(|(id, packed)| (id, Portion::from_packed(packed)))
            .collect()
    }

    /// All ids in ascending order
    pub fn list(&self) -> Vec<LumpId> {
        self.map.keys().copied().collect()
    }

    /// Ids in `range`, ascending, at most `max` of them
    pub fn list_range(&self, range: Range<LumpId>, max: usize) -> Vec<LumpId> {
        if range.start >= range.end {
            return Vec::new();
        }
        self.map.range(range).map(|(id, _)| *id).take(max).collect()
    }

    /// Every live data-region portion; feeds allocator reconstruction
    pub fn data_portions(&self) -> Vec<DataPortion> {
        self.map
            .values()
            .filter_map(|packed| match Portion::from_packed(*packed) {
                Portion::Data(portion) => Some(portion),
                Portion::Journal(_) => None,
            })
            .collect()
    }

    /// Smallest id at or after `from`
    pub fn first(&self, from: LumpId) -> Option<LumpId> {
        self.map.range(from..).next().map(|(id, _)| *id)
    }

    /// Smallest id with no entry, scanning upward from zero
    pub fn first_empty(&self) -> Option<LumpId> {
        let mut candidate = 0u128;
        for id in self.map.keys() {
            if id.as_u128() != candidate {
                break;
            }
            candidate = candidate.checked_add(1)?;
        }
        Some(LumpId::new(candidate))
    }

    pub fn min(&self) -> Option<LumpId> {
        self.map.keys().next().copied()
    }

    pub fn max(&self) -> Option<LumpId> {
        self.map.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
