//! Tests for the journal record codec
//!
//! These tests verify:
//! - Wire sizes and byte layout of each record kind
//! - Decoding of every variant written by `write_to`
//! - Corruption detection: flipped bytes, unknown tags, truncation

use std::io::Cursor;

use lumpstore::address::Address;
use lumpstore::journal::{
    JournalEntry, JournalRecord, EMBEDDED_DATA_OFFSET, TAG_DELETE, TAG_EMBED, TAG_PUT,
};
use lumpstore::portion::DataPortion;
use lumpstore::{LumpId, LumpstoreError};

// =============================================================================
// Helper Functions
// =============================================================================

fn all_variants() -> Vec<JournalRecord> {
    vec![
        JournalRecord::EndOfRecords,
        JournalRecord::GoToFront,
        JournalRecord::Put {
            lump_id: LumpId::new(0xdead_beef),
            portion: DataPortion {
                start: Address::from_u64((1 << 40) - 1).unwrap(),
                len: 3,
            },
        },
        JournalRecord::Embed {
            lump_id: LumpId::new(7),
            data: b"hello".to_vec(),
        },
        JournalRecord::Embed {
            lump_id: LumpId::new(8),
            data: Vec::new(),
        },
        JournalRecord::Delete {
            lump_id: LumpId::new(u128::MAX),
        },
        JournalRecord::DeleteRange {
            range: LumpId::new(10)..LumpId::new(20),
        },
    ]
}

fn write(record: &JournalRecord) -> Vec<u8> {
    let mut buf = Vec::new();
    record.write_to(&mut buf).unwrap();
    buf
}

fn read(bytes: &[u8]) -> lumpstore::Result<JournalRecord> {
    JournalRecord::read_from(&mut Cursor::new(bytes))
}

// =============================================================================
// Size Tests
// =============================================================================

#[test]
fn test_external_sizes() {
    let sizes: Vec<u64> = all_variants().iter().map(|r| r.external_size()).collect();
    assert_eq!(sizes, vec![5, 5, 28, 28, 23, 21, 37]);
    assert_eq!(EMBEDDED_DATA_OFFSET, 23);
}

#[test]
fn test_encoded_length_matches_external_size() {
    for record in all_variants() {
        assert_eq!(write(&record).len() as u64, record.external_size(), "{:?}", record);
    }
}

#[test]
fn test_put_layout() {
    let record = JournalRecord::Put {
        lump_id: LumpId::new(1),
        portion: DataPortion {
            start: Address::from(0x0102_0304u32),
            len: 0x0506,
        },
    };
    let bytes = write(&record);
    assert_eq!(bytes[4], TAG_PUT);
    assert_eq!(bytes[20], 1);
    assert_eq!(&bytes[21..26], &[0x00, 0x01, 0x02, 0x03, 0x04]);
    assert_eq!(&bytes[26..28], &[0x05, 0x06]);
}

#[test]
fn test_embed_layout() {
    let bytes = write(&JournalRecord::Embed {
        lump_id: LumpId::new(2),
        data: b"xyz".to_vec(),
    });
    assert_eq!(bytes[4], TAG_EMBED);
    assert_eq!(&bytes[21..23], &[0, 3]);
    assert_eq!(&bytes[23..], b"xyz");
}

#[test]
fn test_control_records() {
    assert!(JournalRecord::EndOfRecords.is_control());
    assert!(JournalRecord::GoToFront.is_control());
    assert!(!JournalRecord::Delete { lump_id: LumpId::new(1) }.is_control());
}

// =============================================================================
// Decode Tests
// =============================================================================

#[test]
fn test_every_variant_decodes_to_itself() {
    for record in all_variants() {
        assert_eq!(read(&write(&record)).unwrap(), record);
    }
}

#[test]
fn test_consecutive_records_in_one_stream() {
    let mut buf = Vec::new();
    for record in all_variants() {
        record.write_to(&mut buf).unwrap();
    }
    let mut cursor = Cursor::new(buf);
    for record in all_variants() {
        assert_eq!(JournalRecord::read_from(&mut cursor).unwrap(), record);
    }
}

#[test]
fn test_entry_end() {
    let entry = JournalEntry {
        start: Address::from(100u32),
        record: JournalRecord::Delete { lump_id: LumpId::new(1) },
    };
    assert_eq!(entry.end(), 121);
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_flipped_payload_byte_is_detected() {
    for record in all_variants() {
        let clean = write(&record);
        for i in 5..clean.len() {
            let mut bytes = clean.clone();
            bytes[i] ^= 0x01;
            assert!(
                matches!(read(&bytes), Err(LumpstoreError::StorageCorrupted(_))),
                "{:?} byte {}",
                record,
                i
            );
        }
    }
}

#[test]
fn test_flipped_checksum_is_detected() {
    let mut bytes = write(&JournalRecord::Delete { lump_id: LumpId::new(5) });
    bytes[0] ^= 0x80;
    assert!(matches!(read(&bytes), Err(LumpstoreError::StorageCorrupted(_))));
}

#[test]
fn test_unknown_tag() {
    let mut bytes = write(&JournalRecord::Delete { lump_id: LumpId::new(5) });
    bytes[4] = 2;
    assert!(matches!(read(&bytes), Err(LumpstoreError::StorageCorrupted(_))));
}

#[test]
fn test_truncated_record() {
    let bytes = write(&JournalRecord::Delete { lump_id: LumpId::new(5) });
    assert_eq!(bytes[4], TAG_DELETE);
    assert!(matches!(read(&bytes[..10]), Err(LumpstoreError::StorageCorrupted(_))));
    assert!(matches!(read(&bytes[..3]), Err(LumpstoreError::StorageCorrupted(_))));
}

#[test]
fn test_zeroed_bytes_are_not_a_record() {
    assert!(matches!(read(&[0u8; 16]), Err(LumpstoreError::StorageCorrupted(_))));
}

#[test]
fn test_oversized_embed_is_rejected() {
    let record = JournalRecord::Embed {
        lump_id: LumpId::new(1),
        data: vec![0; 0x1_0000],
    };
    assert!(matches!(record.encode(), Err(LumpstoreError::InvalidInput(_))));
}
