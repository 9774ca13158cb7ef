//! # lumpstore
//!
//! An embedded, crash-consistent storage engine for "lumps": immutable
//! byte payloads addressed by a 128-bit id. Features:
//! - Checksummed write-ahead journal laid out as a ring buffer
//! - Small payloads embedded directly in journal records
//! - Large payloads in a block-aligned data region with pluggable allocators
//! - Index rebuilt from the journal on open, so crashes lose at most the
//!   operations after the last sync
//! - Pluggable non-volatile memory: in-memory buffers or `.lusf` files
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Storage                             │
//! │           (put / get / delete / delete_range / list)        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Journal   │          │ Data region │
//!   │ (ring + GC) │          │ (allocator) │
//!   └──────┬──────┘          └──────┬──────┘
//!          │   replay               │
//!          ▼                        │
//!   ┌─────────────┐                 │
//!   │  LumpIndex  │                 │
//!   │ (in memory) │                 │
//!   └─────────────┘                 │
//!                                   ▼
//!                    ┌────────────────────────────┐
//!                    │ NonVolatileMemory          │
//!                    │ (MemoryNvm / FileNvm)      │
//!                    └────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod address;
pub mod block;
pub mod lump;
pub mod portion;
pub mod nvm;
pub mod allocator;
pub mod index;
pub mod journal;
pub mod storage;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{LumpstoreError, Result};
pub use config::Config;
pub use allocator::AllocatorKind;
pub use block::{AlignedBytes, BlockSize};
pub use lump::{LumpData, LumpId};
pub use nvm::{FileNvm, MemoryNvm, NonVolatileMemory, StorageHeader};
pub use storage::{Storage, StorageUsage};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of lumpstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
