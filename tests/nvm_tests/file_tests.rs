//! Tests for FileNvm
//!
//! These tests verify:
//! - The `.lusf` suffix and create-new semantics
//! - Exclusive locking between handles
//! - Aligned reads and writes through split views

use std::io::SeekFrom;
use std::path::PathBuf;

use lumpstore::nvm::StorageHeader;
use lumpstore::{BlockSize, FileNvm, LumpstoreError, NonVolatileMemory};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_path(name: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(name);
    (temp_dir, path)
}

fn create(path: &PathBuf, capacity: u64) -> lumpstore::Result<FileNvm> {
    FileNvm::create(path, capacity, BlockSize::min(), false)
}

// =============================================================================
// Create Tests
// =============================================================================

#[test]
fn test_create_requires_lusf_extension() {
    let (_temp, path) = setup_temp_path("storage.dat");
    assert!(matches!(create(&path, 4096), Err(LumpstoreError::InvalidInput(_))));
    assert!(!path.exists());
}

#[test]
fn test_create_preallocates() {
    let (_temp, path) = setup_temp_path("storage.lusf");
    let nvm = create(&path, 8192).unwrap();

    assert_eq!(nvm.capacity(), 8192);
    assert_eq!(nvm.path(), path.as_path());
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 8192);
}

#[test]
fn test_create_rejects_existing_file() {
    let (_temp, path) = setup_temp_path("storage.lusf");
    drop(create(&path, 4096).unwrap());
    assert!(matches!(create(&path, 4096), Err(LumpstoreError::InvalidInput(_))));
}

#[test]
fn test_create_rejects_unaligned_capacity() {
    let (_temp, path) = setup_temp_path("storage.lusf");
    assert!(create(&path, 1000).is_err());
}

// =============================================================================
// Locking Tests
// =============================================================================

#[test]
fn test_second_handle_is_busy() {
    let (_temp, path) = setup_temp_path("storage.lusf");
    let mut nvm = create(&path, 4096).unwrap();

    let header = StorageHeader::new(BlockSize::min(), 1024, 2048);
    let mut region = Vec::new();
    header.write_region_to(&mut region).unwrap();
    nvm.write(&region).unwrap();
    nvm.sync().unwrap();

    assert!(matches!(FileNvm::open(&path, false), Err(LumpstoreError::DeviceBusy(_))));

    drop(nvm);
    let reopened = FileNvm::open(&path, false).unwrap();
    assert_eq!(reopened.capacity(), header.storage_size());
}

#[test]
fn test_open_rejects_truncated_file() {
    let (_temp, path) = setup_temp_path("storage.lusf");
    let mut nvm = create(&path, 4096).unwrap();
    let header = StorageHeader::new(BlockSize::min(), 1024, 2048);
    let mut region = Vec::new();
    header.write_region_to(&mut region).unwrap();
    nvm.write(&region).unwrap();
    nvm.sync().unwrap();
    drop(nvm);

    // Still covers the header block, but not the regions it describes
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(2048).unwrap();
    drop(file);

    assert!(matches!(
        FileNvm::open(&path, false),
        Err(LumpstoreError::StorageCorrupted(_))
    ));
}

// =============================================================================
// Read/Write Tests
// =============================================================================

#[test]
fn test_split_views_write_to_their_own_ranges() {
    let (_temp, path) = setup_temp_path("storage.lusf");
    let nvm = create(&path, 4096).unwrap();
    let (mut left, mut right) = nvm.split(1024).unwrap();

    right.seek(SeekFrom::Start(512)).unwrap();
    right.write(&[0xCD; 512]).unwrap();
    left.write(&[0xAB; 1024]).unwrap();
    left.sync().unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert!(bytes[..1024].iter().all(|b| *b == 0xAB));
    assert!(bytes[1024..1536].iter().all(|b| *b == 0));
    assert!(bytes[1536..2048].iter().all(|b| *b == 0xCD));

    let mut buf = [0; 512];
    right.seek(SeekFrom::Start(512)).unwrap();
    assert_eq!(right.read(&mut buf).unwrap(), 512);
    assert!(buf.iter().all(|b| *b == 0xCD));
}

#[test]
fn test_unaligned_write_is_rejected() {
    let (_temp, path) = setup_temp_path("storage.lusf");
    let mut nvm = create(&path, 4096).unwrap();
    assert!(matches!(nvm.write(&[1; 10]), Err(LumpstoreError::InvalidInput(_))));
    assert!(nvm.write(&[1; 8192]).is_err());
}
