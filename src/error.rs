//! Error types for lumpstore
//!
//! Provides a unified error type for all operations, plus the abort path
//! used when internal bookkeeping is found to be broken.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::lump::LumpId;

/// Result type alias using LumpstoreError
pub type Result<T> = std::result::Result<T, LumpstoreError>;

/// Unified error type for lumpstore operations
#[derive(Debug, Error)]
pub enum LumpstoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[source] io::Error),

    #[error("Device busy: {0}")]
    DeviceBusy(String),

    // -------------------------------------------------------------------------
    // Caller Errors
    // -------------------------------------------------------------------------
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Lump not found: {0}")]
    LumpNotFound(LumpId),

    // -------------------------------------------------------------------------
    // Capacity Errors
    // -------------------------------------------------------------------------
    #[error("Storage full: {0}")]
    StorageFull(String),

    // -------------------------------------------------------------------------
    // On-disk State Errors
    // -------------------------------------------------------------------------
    #[error("Storage corrupted: {0}")]
    StorageCorrupted(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LumpstoreError {
    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        LumpstoreError::InvalidInput(message.into())
    }

    pub(crate) fn corrupted(message: impl Into<String>) -> Self {
        LumpstoreError::StorageCorrupted(message.into())
    }

    pub(crate) fn full(message: impl Into<String>) -> Self {
        LumpstoreError::StorageFull(message.into())
    }
}

// The journal buffer speaks `std::io`, so our own errors can come back
// wrapped inside an `io::Error`. Unwrap them instead of nesting.
impl From<io::Error> for LumpstoreError {
    fn from(err: io::Error) -> Self {
        let wrapped = err
            .get_ref()
            .map_or(false, |inner| inner.is::<LumpstoreError>());
        if !wrapped {
            return LumpstoreError::Io(err);
        }
        let kind = err.kind();
        match err.into_inner().map(|inner| inner.downcast::<LumpstoreError>()) {
            Some(Ok(ours)) => *ours,
            Some(Err(other)) => LumpstoreError::Io(io::Error::new(kind, other)),
            None => LumpstoreError::Io(io::Error::from(kind)),
        }
    }
}

impl From<LumpstoreError> for io::Error {
    fn from(err: LumpstoreError) -> Self {
        match err {
            LumpstoreError::Io(inner) => inner,
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}

/// Aborts on a broken internal invariant.
///
/// These conditions mean the free-space or ring accounting is already wrong,
/// so they are never surfaced as a `Result`.
#[track_caller]
pub(crate) fn invariant_violation(context: impl fmt::Display) -> ! {
    tracing::error!("invariant violation: {}", context);
    panic!("invariant violation: {}", context)
}
