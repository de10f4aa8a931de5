//! Tests for the record codec
//!
//! These tests verify:
//! - Header layout (big-endian, 16 bytes)
//! - Checksum and key validation on decode
//! - Padding and tombstone detection

use bytecask::datafile::{encode_record, Header, Record, HEADER_SIZE};
use bytecask::BytecaskError;
use bytes::BytesMut;

// =============================================================================
// Helper Functions
// =============================================================================

fn encoded(key: &str, value: &[u8], timestamp: u32) -> Vec<u8> {
    let header = Header::new(key.as_bytes(), value, timestamp);
    let mut buf = BytesMut::new();
    encode_record(&mut buf, &header, key.as_bytes(), value);
    buf.to_vec()
}

// =============================================================================
// Layout Tests
// =============================================================================

#[test]
fn test_header_is_big_endian() {
    let bytes = encoded("ab", b"xyz", 0x0102_0304);

    assert_eq!(bytes.len(), HEADER_SIZE + 2 + 3);
    assert_eq!(&bytes[0..4], &crc32fast::hash(b"xyz").to_be_bytes());
    assert_eq!(&bytes[4..8], &[0x01, 0x02, 0x03, 0x04]);
    assert_eq!(&bytes[8..12], &[0, 0, 0, 2]);
    assert_eq!(&bytes[12..16], &[0, 0, 0, 3]);
    assert_eq!(&bytes[16..], b"abxyz");
}

#[test]
fn test_record_size_matches_encoding() {
    let header = Header::new(b"key", b"value", 7);
    assert_eq!(header.record_size(), encoded("key", b"value", 7).len() as u64);
}

#[test]
fn test_decode_record() {
    let record = Record::decode(&encoded("name", b"bytecask", 42)).unwrap();

    assert_eq!(record.key, "name");
    assert_eq!(record.value, b"bytecask");
    assert_eq!(record.header.timestamp, 42);
    assert!(!record.is_tombstone());
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_flipped_value_byte_fails_checksum() {
    let mut bytes = encoded("k", b"value", 1);
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;

    match Record::decode(&bytes) {
        Err(BytecaskError::CorruptRecord { expected, actual }) => assert_ne!(expected, actual),
        other => panic!("expected checksum failure, got {:?}", other),
    }
}

#[test]
fn test_length_mismatch_rejected() {
    let bytes = encoded("k", b"value", 1);

    assert!(matches!(
        Record::decode(&bytes[..bytes.len() - 1]),
        Err(BytecaskError::CorruptHeader(_))
    ));
}

#[test]
fn test_short_header_rejected() {
    assert!(matches!(Header::decode(&[0u8; 10]), Err(BytecaskError::CorruptHeader(_))));
}

#[test]
fn test_non_utf8_key_rejected() {
    let value = b"v";
    let header = Header::new(&[0xFF, 0xFE], value, 1);
    let mut buf = BytesMut::new();
    encode_record(&mut buf, &header, &[0xFF, 0xFE], value);

    assert!(matches!(Record::decode(&buf), Err(BytecaskError::CorruptKey(_))));
}

// =============================================================================
// Special Records
// =============================================================================

#[test]
fn test_padding_and_tombstone_flags() {
    let padding = Header::decode(&[0u8; HEADER_SIZE]).unwrap();
    assert!(padding.is_padding());

    let tombstone = Record::decode(&encoded("gone", b"", 5)).unwrap();
    assert!(tombstone.is_tombstone());
    assert!(!tombstone.header.is_padding());
}
