//! Tests for Datafile and FileDir
//!
//! These tests verify:
//! - Records appended through one handle are readable at their offsets
//! - Concurrent appends never interleave
//! - Naming scheme and file directory bookkeeping

use std::sync::Arc;
use std::thread;

use bytecask::datafile::{
    datafile_path, encode_record, parse_datafile_id, Datafile, FileDir, Header, Record,
};
use bytes::BytesMut;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn record_bytes(key: &str, value: &[u8]) -> Vec<u8> {
    let header = Header::new(key.as_bytes(), value, 1);
    let mut buf = BytesMut::new();
    encode_record(&mut buf, &header, key.as_bytes(), value);
    buf.to_vec()
}

fn setup_datafile(id: u32) -> (TempDir, Arc<Datafile>) {
    let temp_dir = TempDir::new().unwrap();
    let path = datafile_path(temp_dir.path(), id);
    let datafile = Arc::new(Datafile::create(&path, id, 1024 * 1024).unwrap());
    (temp_dir, datafile)
}

// =============================================================================
// Datafile Tests
// =============================================================================

#[test]
fn test_records_readable_at_returned_offsets() {
    let (_temp, datafile) = setup_datafile(1);

    let first = record_bytes("a", b"one");
    let second = record_bytes("b", b"two");
    let off_a = datafile.append(&first).unwrap();
    let off_b = datafile.append(&second).unwrap();

    let a = Record::decode(&datafile.read(off_a, first.len() as u64).unwrap()).unwrap();
    let b = Record::decode(&datafile.read(off_b, second.len() as u64).unwrap()).unwrap();
    assert_eq!((a.key.as_str(), a.value.as_slice()), ("a", &b"one"[..]));
    assert_eq!((b.key.as_str(), b.value.as_slice()), ("b", &b"two"[..]));
}

#[test]
fn test_concurrent_appends_do_not_interleave() {
    let (_temp, datafile) = setup_datafile(1);
    let mut handles = vec![];

    for t in 0..4 {
        let datafile = Arc::clone(&datafile);
        handles.push(thread::spawn(move || {
            let mut placed = vec![];
            for i in 0..50 {
                let bytes = record_bytes(&format!("t{}-{}", t, i), format!("v{}", i).as_bytes());
                let offset = datafile.append(&bytes).unwrap();
                placed.push((offset, bytes));
            }
            placed
        }));
    }

    for handle in handles {
        for (offset, bytes) in handle.join().unwrap() {
            assert_eq!(datafile.read(offset, bytes.len() as u64).unwrap(), bytes);
        }
    }
}

#[test]
fn test_reads_during_appends() {
    let (_temp, datafile) = setup_datafile(1);
    let bytes = record_bytes("stable", b"value");
    let offset = datafile.append(&bytes).unwrap();

    let writer = {
        let datafile = Arc::clone(&datafile);
        thread::spawn(move || {
            for i in 0..200 {
                datafile.append(&record_bytes("k", format!("{}", i).as_bytes())).unwrap();
            }
        })
    };

    for _ in 0..200 {
        assert_eq!(datafile.read(offset, bytes.len() as u64).unwrap(), bytes);
    }
    writer.join().unwrap();
}

// =============================================================================
// FileDir Tests
// =============================================================================

#[test]
fn test_datafile_naming() {
    let path = datafile_path(std::path::Path::new("/tmp/gen"), 12);
    assert!(path.ends_with("data_12.db"));

    assert_eq!(parse_datafile_id("data_12.db"), Some(12));
    assert_eq!(parse_datafile_id("key_hint.db"), None);
    assert_eq!(parse_datafile_id("data_x.db"), None);
}

#[test]
fn test_filedir_orders_by_id_and_closes_all() {
    let temp_dir = TempDir::new().unwrap();
    let mut filedir = FileDir::new();

    for id in [3, 1, 2] {
        let datafile = Datafile::create(&datafile_path(temp_dir.path(), id), id, 1024).unwrap();
        datafile.append(&record_bytes("k", b"v")).unwrap();
        filedir.insert(Arc::new(datafile));
    }

    assert_eq!(filedir.ids().collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(filedir.total_size(), 3 * record_bytes("k", b"v").len() as u64);

    let handle = Arc::clone(filedir.get(2).unwrap());
    filedir.close_all();
    assert!(handle.is_closed());
    assert!(handle.read(0, 1).unwrap_err().is_retryable());
}
