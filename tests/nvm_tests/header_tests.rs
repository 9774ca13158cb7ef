//! Tests for the storage header
//!
//! These tests verify:
//! - Encode/decode of every field
//! - Rejection of bad magic, versions and sizes
//! - Region sizing for new storages

use bytes::BytesMut;
use lumpstore::nvm::{
    StorageHeader, FULL_HEADER_SIZE, HEADER_SIZE, MAJOR_VERSION, MAX_JOURNAL_REGION_SIZE,
    MINOR_VERSION,
};
use lumpstore::{BlockSize, LumpstoreError, MemoryNvm, NonVolatileMemory};

// =============================================================================
// Helper Functions
// =============================================================================

fn encoded(header: &StorageHeader) -> Vec<u8> {
    let mut buf = BytesMut::new();
    header.encode(&mut buf);
    buf.to_vec()
}

fn sample() -> StorageHeader {
    StorageHeader::new(BlockSize::min(), 1024 * 1024, 64 * 1024 * 1024)
}

// =============================================================================
// Encoding Tests
// =============================================================================

#[test]
fn test_encoded_layout() {
    let header = sample();
    let bytes = encoded(&header);

    assert_eq!(bytes.len(), FULL_HEADER_SIZE as usize);
    assert_eq!(&bytes[..4], b"lusf");
    assert_eq!(u16::from_be_bytes([bytes[4], bytes[5]]), HEADER_SIZE);
    assert_eq!(u16::from_be_bytes([bytes[6], bytes[7]]), MAJOR_VERSION);
    assert_eq!(u16::from_be_bytes([bytes[8], bytes[9]]), MINOR_VERSION);
    assert_eq!(u16::from_be_bytes([bytes[10], bytes[11]]), 512);
    assert_eq!(&bytes[12..28], header.instance_uuid.as_bytes());
}

#[test]
fn test_decode_round_trip() {
    let header = sample();
    let decoded = StorageHeader::decode(&encoded(&header)).unwrap();
    assert_eq!(decoded, header);
}

#[test]
fn test_region_sizes() {
    let header = sample();
    assert_eq!(header.region_size(), 512);
    assert_eq!(header.storage_size(), 512 + 1024 * 1024 + 64 * 1024 * 1024);
}

// =============================================================================
// Rejection Tests
// =============================================================================

#[test]
fn test_bad_magic() {
    let mut bytes = encoded(&sample());
    bytes[0] = b'x';
    assert!(matches!(StorageHeader::decode(&bytes), Err(LumpstoreError::InvalidInput(_))));
}

#[test]
fn test_header_size_mismatch() {
    let mut bytes = encoded(&sample());
    bytes[5] = (HEADER_SIZE - 1) as u8;
    assert!(matches!(StorageHeader::decode(&bytes), Err(LumpstoreError::InvalidInput(_))));

    bytes[5] = (HEADER_SIZE + 1) as u8;
    assert!(matches!(StorageHeader::decode(&bytes), Err(LumpstoreError::StorageCorrupted(_))));
}

#[test]
fn test_unsupported_versions() {
    let mut bytes = encoded(&sample());
    bytes[7] = (MAJOR_VERSION + 1) as u8;
    assert!(matches!(StorageHeader::decode(&bytes), Err(LumpstoreError::InvalidInput(_))));

    let mut bytes = encoded(&sample());
    bytes[9] = (MINOR_VERSION + 1) as u8;
    assert!(matches!(StorageHeader::decode(&bytes), Err(LumpstoreError::InvalidInput(_))));

    // Older minor versions stay readable
    let mut bytes = encoded(&sample());
    bytes[9] = 0;
    assert_eq!(StorageHeader::decode(&bytes).unwrap().minor_version, 0);
}

#[test]
fn test_bad_block_size() {
    let mut bytes = encoded(&sample());
    bytes[10] = 0;
    bytes[11] = 100;
    assert!(matches!(StorageHeader::decode(&bytes), Err(LumpstoreError::InvalidInput(_))));
}

#[test]
fn test_oversized_journal_region() {
    let header = StorageHeader::new(BlockSize::min(), MAX_JOURNAL_REGION_SIZE + 1, 512);
    assert!(matches!(
        StorageHeader::decode(&encoded(&header)),
        Err(LumpstoreError::InvalidInput(_))
    ));
}

#[test]
fn test_truncated_header() {
    let bytes = encoded(&sample());
    assert!(matches!(
        StorageHeader::decode(&bytes[..20]),
        Err(LumpstoreError::StorageCorrupted(_))
    ));
}

// =============================================================================
// Sizing Tests
// =============================================================================

#[test]
fn test_for_capacity_splits_regions() {
    let capacity = 10 * 1024 * 1024;
    let header = StorageHeader::for_capacity(capacity, BlockSize::min(), 0.01).unwrap();

    assert_eq!(header.journal_region_size, BlockSize::min().ceil_align(104_858));
    assert_eq!(
        header.data_region_size,
        capacity - header.region_size() - header.journal_region_size
    );
    assert!(header.storage_size() <= capacity);
}

#[test]
fn test_for_capacity_minimums() {
    // Header block + two journal blocks + one data block
    assert!(StorageHeader::for_capacity(4 * 512, BlockSize::min(), 0.01).is_ok());
    assert!(StorageHeader::for_capacity(3 * 512, BlockSize::min(), 0.01).is_err());

    let header = StorageHeader::for_capacity(4 * 512, BlockSize::min(), 0.01).unwrap();
    assert_eq!(header.journal_region_size, 1024);
    assert_eq!(header.data_region_size, 512);
}

#[test]
fn test_for_capacity_journal_cannot_eat_data_region() {
    let result = StorageHeader::for_capacity(8 * 512, BlockSize::min(), 0.99);
    assert!(matches!(result, Err(LumpstoreError::InvalidInput(_))));
}

// =============================================================================
// NVM Tests
// =============================================================================

#[test]
fn test_write_region_and_split() {
    let header = StorageHeader::new(BlockSize::min(), 1024, 2048);
    let mut region = Vec::new();
    header.write_region_to(&mut region).unwrap();
    assert_eq!(region.len(), 512);

    let mut bytes = vec![0; 4096];
    bytes[..512].copy_from_slice(&region);
    let mut nvm = MemoryNvm::from_vec(bytes, BlockSize::min()).unwrap();

    let read = StorageHeader::read_from_nvm(&mut nvm).unwrap();
    assert_eq!(read, header);

    let (journal, data) = read.split_regions(nvm).unwrap();
    assert_eq!(journal.capacity(), 1024);
    assert_eq!(data.capacity(), 2048);
}
