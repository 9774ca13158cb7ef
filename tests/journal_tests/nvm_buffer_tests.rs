//! Tests for JournalNvmBuffer

use std::io::{Read, Seek, SeekFrom, Write};

use lumpstore::journal::JournalNvmBuffer;
use lumpstore::MemoryNvm;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup(capacity: u64) -> (MemoryNvm, JournalNvmBuffer<MemoryNvm>) {
    let nvm = MemoryNvm::new(capacity).unwrap();
    let observer = nvm.clone();
    (observer, JournalNvmBuffer::new(nvm))
}

// =============================================================================
// Staging Tests
// =============================================================================

#[test]
fn test_writes_are_staged_until_flush() {
    let (observer, mut buffer) = setup(2048);
    buffer.seek(SeekFrom::Start(10)).unwrap();
    buffer.write_all(b"abc").unwrap();
    assert_eq!(buffer.position(), 13);
    assert_eq!(&observer.to_vec()[10..13], &[0, 0, 0]);

    buffer.flush().unwrap();
    assert_eq!(&observer.to_vec()[10..13], b"abc");
}

#[test]
fn test_read_sees_staged_bytes() {
    let (_observer, mut buffer) = setup(2048);
    buffer.seek(SeekFrom::Start(500)).unwrap();
    buffer.write_all(&[5; 30]).unwrap();

    let mut read = [0; 40];
    buffer.seek(SeekFrom::Start(495)).unwrap();
    buffer.read_exact(&mut read).unwrap();
    assert_eq!(&read[..5], &[0; 5]);
    assert_eq!(&read[5..35], &[5; 30]);
    assert_eq!(&read[35..], &[0; 5]);
}

#[test]
fn test_unaligned_write_preserves_block_contents() {
    let (observer, mut buffer) = setup(1024);
    observer.with_bytes_mut(|bytes| bytes[..512].fill(0xAA));

    buffer.seek(SeekFrom::Start(100)).unwrap();
    buffer.write_all(b"xy").unwrap();
    buffer.flush().unwrap();

    let bytes = observer.to_vec();
    assert_eq!(bytes[99], 0xAA);
    assert_eq!(&bytes[100..102], b"xy");
    assert_eq!(bytes[102], 0xAA);
}

#[test]
fn test_write_elsewhere_flushes_previous_window() {
    let (observer, mut buffer) = setup(4096);
    buffer.seek(SeekFrom::Start(0)).unwrap();
    buffer.write_all(b"first").unwrap();

    buffer.seek(SeekFrom::Start(3000)).unwrap();
    buffer.write_all(b"second").unwrap();

    let bytes = observer.to_vec();
    assert_eq!(&bytes[..5], b"first");
    assert_eq!(&bytes[3000..3006], &[0; 6]);

    buffer.sync().unwrap();
    assert_eq!(&observer.to_vec()[3000..3006], b"second");
}

#[test]
fn test_appends_across_block_boundary() {
    let (observer, mut buffer) = setup(2048);
    buffer.seek(SeekFrom::Start(0)).unwrap();
    for _ in 0..100 {
        buffer.write_all(&[1; 7]).unwrap();
    }
    buffer.flush().unwrap();
    // Appending after a flush continues in the retained last block
    buffer.write_all(&[2; 10]).unwrap();
    buffer.flush().unwrap();

    let bytes = observer.to_vec();
    assert!(bytes[..700].iter().all(|b| *b == 1));
    assert!(bytes[700..710].iter().all(|b| *b == 2));
    assert_eq!(bytes[710], 0);
}

#[test]
fn test_read_stops_at_capacity() {
    let (_observer, mut buffer) = setup(1024);
    buffer.seek(SeekFrom::Start(1020)).unwrap();
    let mut read = [0; 10];
    assert_eq!(buffer.read(&mut read).unwrap(), 4);
    assert_eq!(buffer.read(&mut read).unwrap(), 0);
}

#[test]
fn test_seek_beyond_capacity_fails() {
    let (_observer, mut buffer) = setup(1024);
    assert!(buffer.seek(SeekFrom::Start(1025)).is_err());
    assert!(buffer.seek_to(1024).is_ok());
}

#[test]
#[should_panic(expected = "invariant violation")]
fn test_write_past_capacity_panics() {
    let (_observer, mut buffer) = setup(1024);
    buffer.seek_to(1020).unwrap();
    let _ = buffer.write_all(&[0; 10]);
}
