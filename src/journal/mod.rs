//! Journal Module
//!
//! The write-ahead journal: every mutation is appended here as a
//! checksummed record before it is visible, and the lump index is rebuilt
//! from it at open time.
//!
//! ## Region layout
//! ```text
//! ┌──────────────┬───────────────────────────────────────────────┐
//! │ header block │ ring: [rec][rec][rec][EOR] ........ [rec][GTF]│
//! │ (head: u64)  │                                               │
//! └──────────────┴───────────────────────────────────────────────┘
//! ```
//!
//! ## Components
//! - `record`: record enum and its checksummed wire codec
//! - `nvm_buffer`: unaligned `std::io` access on top of block-only NVM
//! - `ring_buffer`: head/tail bookkeeping, wraparound, replay scans
//! - `header_region`: the persisted head
//! - `region`: index maintenance and garbage collection

mod header_region;
mod nvm_buffer;
mod record;
mod region;
mod ring_buffer;

pub use header_region::JournalHeaderRegion;
pub use nvm_buffer::JournalNvmBuffer;
pub use record::{
    JournalEntry, JournalRecord, EMBEDDED_DATA_OFFSET, END_OF_RECORDS_SIZE, RECORD_HEADER_SIZE,
    TAG_DELETE, TAG_DELETE_RANGE, TAG_EMBED, TAG_END_OF_RECORDS, TAG_GO_TO_FRONT, TAG_PUT,
};
pub use region::{JournalOptions, JournalRegion};
pub use ring_buffer::JournalRingBuffer;

/// Point-in-time view of the journal ring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalSnapshot {
    /// Oldest byte that may not be overwritten yet
    pub unreleased_head: u64,
    /// Oldest record not yet taken by GC
    pub head: u64,
    /// Position of the `EndOfRecords` sentinel
    pub tail: u64,
    /// Records between `head` and `tail`
    pub entries: Vec<JournalEntry>,
}
