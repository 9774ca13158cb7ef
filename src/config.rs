//! Configuration for lumpstore
//!
//! Centralized configuration with sensible defaults.

use crate::allocator::AllocatorKind;
use crate::block::BlockSize;
use crate::error::{LumpstoreError, Result};
use crate::journal::JournalOptions;
use crate::lump::MAX_EMBEDDED_SIZE;

/// Main configuration for a storage instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Layout Configuration (used at create time)
    // -------------------------------------------------------------------------
    /// Block size of newly created storages
    pub block_size: BlockSize,

    /// Fraction of the capacity reserved for the journal region
    pub journal_ratio: f64,

    // -------------------------------------------------------------------------
    // Placement Configuration
    // -------------------------------------------------------------------------
    /// Payloads up to this many bytes are embedded in the journal
    pub embed_threshold: usize,

    /// Free-space allocator backend
    pub allocator: AllocatorKind,

    // -------------------------------------------------------------------------
    // Journal Configuration
    // -------------------------------------------------------------------------
    /// Records moved into the GC queue per refill
    pub gc_queue_size: usize,

    /// Ring usage fraction that triggers per-append GC
    pub gc_usage_ratio: f64,

    /// GC steps per `run_side_job_once`
    pub side_job_gc_count: usize,

    /// Appends between implicit journal syncs
    pub sync_interval: usize,

    /// Run one GC step after every append
    pub automatic_gc: bool,

    // -------------------------------------------------------------------------
    // Device Configuration
    // -------------------------------------------------------------------------
    /// Open storage files with O_DIRECT (Linux only)
    pub direct_io: bool,
}

impl Default for Config {
    fn default() -> Self {
        let journal = JournalOptions::default();
        Self {
            block_size: BlockSize::min(),
            journal_ratio: 0.01,
            embed_threshold: 128,
            allocator: AllocatorKind::default(),
            gc_queue_size: journal.gc_queue_size,
            gc_usage_ratio: journal.gc_usage_ratio,
            side_job_gc_count: journal.side_job_gc_count,
            sync_interval: journal.sync_interval,
            automatic_gc: journal.automatic_gc,
            direct_io: true,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Rejects values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if !(self.journal_ratio > 0.0 && self.journal_ratio < 1.0) {
            return Err(LumpstoreError::Config(format!(
                "journal_ratio must be in (0, 1), got {}",
                self.journal_ratio
            )));
        }
        if self.embed_threshold > MAX_EMBEDDED_SIZE {
            return Err(LumpstoreError::Config(format!(
                "embed_threshold {} exceeds the embeddable maximum of {}",
                self.embed_threshold, MAX_EMBEDDED_SIZE
            )));
        }
        if self.gc_queue_size == 0 {
            return Err(LumpstoreError::Config("gc_queue_size must be positive".into()));
        }
        if !(self.gc_usage_ratio > 0.0 && self.gc_usage_ratio <= 1.0) {
            return Err(LumpstoreError::Config(format!(
                "gc_usage_ratio must be in (0, 1], got {}",
                self.gc_usage_ratio
            )));
        }
        Ok(())
    }

    /// The journal-related subset of the configuration
    pub fn journal_options(&self) -> JournalOptions {
        JournalOptions {
            gc_queue_size: self.gc_queue_size,
            gc_usage_ratio: self.gc_usage_ratio,
            side_job_gc_count: self.side_job_gc_count,
            sync_interval: self.sync_interval,
            automatic_gc: self.automatic_gc,
        }
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the block size used when creating a storage
    pub fn block_size(mut self, block_size: BlockSize) -> Self {
        self.config.block_size = block_size;
        self
    }

    /// Set the fraction of capacity given to the journal
    pub fn journal_ratio(mut self, ratio: f64) -> Self {
        self.config.journal_ratio = ratio;
        self
    }

    /// Set the largest payload that is embedded in the journal (in bytes)
    pub fn embed_threshold(mut self, bytes: usize) -> Self {
        self.config.embed_threshold = bytes;
        self
    }

    /// Set the allocator backend
    pub fn allocator(mut self, kind: AllocatorKind) -> Self {
        self.config.allocator = kind;
        self
    }

    /// Set the GC batch size
    pub fn gc_queue_size(mut self, size: usize) -> Self {
        self.config.gc_queue_size = size;
        self
    }

    /// Set the ring usage fraction that triggers GC
    pub fn gc_usage_ratio(mut self, ratio: f64) -> Self {
        self.config.gc_usage_ratio = ratio;
        self
    }

    /// Set the number of GC steps per side job
    pub fn side_job_gc_count(mut self, count: usize) -> Self {
        self.config.side_job_gc_count = count;
        self
    }

    /// Set the number of appends between implicit syncs
    pub fn sync_interval(mut self, appends: usize) -> Self {
        self.config.sync_interval = appends;
        self
    }

    /// Enable or disable per-append GC
    pub fn automatic_gc(mut self, enabled: bool) -> Self {
        self.config.automatic_gc = enabled;
        self
    }

    /// Enable or disable O_DIRECT
    pub fn direct_io(mut self, enabled: bool) -> Self {
        self.config.direct_io = enabled;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
