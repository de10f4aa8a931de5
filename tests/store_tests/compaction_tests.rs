//! Tests for compaction
//!
//! These tests verify:
//! - Live data survives compaction, deleted keys stay gone
//! - Disk usage shrinks when overwrites or deletes existed
//! - The generation pointer swap and cleanup
//! - Writes racing a compaction are not lost
//! - A failed compaction leaves the live state untouched

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use bytecask::datafile::{Header, Record};
use bytecask::store::{CompactionOutcome, CompactionState, CompactionStats};
use bytecask::{BytecaskError, Store};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_store() -> (TempDir, Store) {
    let temp_dir = TempDir::new().unwrap();
    let store = Store::open_path(temp_dir.path()).unwrap();
    (temp_dir, store)
}

fn compact(store: &Store) -> CompactionStats {
    match store.compact().unwrap() {
        CompactionOutcome::Completed(stats) => stats,
        CompactionOutcome::Skipped => panic!("compaction was skipped"),
    }
}

/// Every record stored in a datafile, in log order
fn records_on_disk(path: &Path) -> Vec<Record> {
    let bytes = fs::read(path).unwrap();
    let mut records = vec![];
    let mut offset = 0usize;
    while offset < bytes.len() {
        let header = Header::decode(&bytes[offset..]).unwrap();
        let end = offset + header.record_size() as usize;
        records.push(Record::decode(&bytes[offset..end]).unwrap());
        offset = end;
    }
    records
}

// =============================================================================
// Guard Tests
// =============================================================================

#[test]
fn test_single_file_is_skipped() {
    let (_temp, store) = setup_temp_store();
    store.set("k", b"v").unwrap();

    assert_eq!(store.compact().unwrap(), CompactionOutcome::Skipped);
    assert_eq!(store.compaction_state(), CompactionState::Idle);
    assert!(store.generation_dir().ends_with("generation_000001"));
}

// =============================================================================
// Correctness Tests
// =============================================================================

#[test]
fn test_overwrite_and_delete_scenario() {
    let (_temp, store) = setup_temp_store();

    store.set("a", b"1").unwrap();
    store.set("b", b"2").unwrap();
    store.set("a", b"3").unwrap();
    store.delete("b").unwrap();
    store.rotate().unwrap();

    assert_eq!(store.get("a").unwrap(), b"3");
    assert!(store.get("b").unwrap_err().is_not_found());

    compact(&store);

    assert_eq!(store.get("a").unwrap(), b"3");
    assert!(store.get("b").unwrap_err().is_not_found());

    let records = records_on_disk(&store.generation_dir().join("data_1.db"));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key, "a");
    assert_eq!(records[0].value, b"3");
}

#[test]
fn test_compaction_preserves_live_data() {
    let (_temp, store) = setup_temp_store();
    let mut expected = HashMap::new();

    for round in 0..3 {
        for i in 0..40 {
            let key = format!("key{}", i);
            let value = format!("value{}-{}", i, round).into_bytes();
            store.set(&key, &value).unwrap();
            expected.insert(key, value);
        }
        store.rotate().unwrap();
    }
    for i in (0..40).step_by(4) {
        let key = format!("key{}", i);
        store.delete(&key).unwrap();
        expected.remove(&key);
    }

    let before = store.disk_usage();
    let stats = compact(&store);

    assert_eq!(stats.live_keys, expected.len());
    assert_eq!(stats.files_before, 4);
    assert!(store.disk_usage() < before);
    assert!(stats.bytes_after < stats.bytes_before);

    for i in 0..40 {
        let key = format!("key{}", i);
        match expected.get(&key) {
            Some(value) => assert_eq!(&store.get(&key).unwrap(), value),
            None => assert!(store.get(&key).unwrap_err().is_not_found()),
        }
    }
}

#[test]
fn test_swap_advances_generation() {
    let (temp_dir, store) = setup_temp_store();
    store.set("k", b"v").unwrap();
    store.rotate().unwrap();
    let old_generation = store.generation_dir();

    let stats = compact(&store);

    assert_eq!(stats.generation, 2);
    assert!(store.generation_dir().ends_with("generation_000002"));
    assert!(!old_generation.exists());
    assert!(!temp_dir.path().join(".compaction").exists());

    let current = fs::read_to_string(temp_dir.path().join("CURRENT")).unwrap();
    assert_eq!(current.trim(), "generation_000002");

    assert_eq!(store.active_file_id(), 2);
    assert_eq!(store.file_count(), 2);
    assert!(store.generation_dir().join("key_hint.db").is_file());
    assert_eq!(store.compaction_state(), CompactionState::Idle);
}

#[test]
fn test_writes_after_compaction_survive_restart() {
    let temp_dir = TempDir::new().unwrap();
    {
        let store = Store::open_path(temp_dir.path()).unwrap();
        store.set("old", b"1").unwrap();
        store.rotate().unwrap();
        compact(&store);

        store.set("new", b"2").unwrap();
        store.set("old", b"3").unwrap();
        store.shutdown().unwrap();
    }

    let store = Store::open_path(temp_dir.path()).unwrap();

    assert_eq!(store.get("old").unwrap(), b"3");
    assert_eq!(store.get("new").unwrap(), b"2");
    assert_eq!(store.active_file_id(), 3);
}

#[test]
fn test_compaction_without_shutdown_recovers_by_hint() {
    let temp_dir = TempDir::new().unwrap();
    {
        let store = Store::open_path(temp_dir.path()).unwrap();
        for i in 0..10 {
            store.set(&format!("k{}", i), b"v").unwrap();
        }
        store.rotate().unwrap();
        compact(&store);
        store.set("tail", b"t").unwrap();
    }

    let store = Store::open_path(temp_dir.path()).unwrap();

    assert_eq!(store.recovery_source(), bytecask::store::RecoverySource::Hint);
    assert_eq!(store.len(), 11);
    assert_eq!(store.get("tail").unwrap(), b"t");
}

#[test]
fn test_repeated_compactions() {
    let (_temp, store) = setup_temp_store();

    for round in 0..4 {
        store.set("k", format!("v{}", round).as_bytes()).unwrap();
        store.rotate().unwrap();
        let stats = compact(&store);
        assert_eq!(stats.generation, round as u64 + 2);
    }

    assert_eq!(store.get("k").unwrap(), b"v3");
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_writes_during_compaction_not_lost() {
    let (_temp, store) = setup_temp_store();
    let store = Arc::new(store);
    for i in 0..200 {
        store.set(&format!("k{}", i), b"initial").unwrap();
    }
    store.rotate().unwrap();

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for round in 0..5 {
                for i in 0..200 {
                    store
                        .set(&format!("k{}", i), format!("round{}", round).as_bytes())
                        .unwrap();
                }
            }
            for i in 0..200 {
                if i % 10 == 0 {
                    store.delete(&format!("k{}", i)).unwrap();
                }
            }
        })
    };

    for _ in 0..5 {
        store.rotate().unwrap();
        compact(&store);
    }
    writer.join().unwrap();

    for i in 0..200 {
        let key = format!("k{}", i);
        if i % 10 == 0 {
            assert!(store.get(&key).unwrap_err().is_not_found());
        } else {
            assert_eq!(store.get(&key).unwrap(), b"round4");
        }
    }
}

#[test]
fn test_reads_during_compaction() {
    let (_temp, store) = setup_temp_store();
    let store = Arc::new(store);
    for i in 0..100 {
        store.set(&format!("k{}", i), format!("v{}", i).as_bytes()).unwrap();
    }

    let compactor = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for _ in 0..5 {
                store.rotate().unwrap();
                compact(&store);
            }
        })
    };

    for _ in 0..10 {
        for i in 0..100 {
            assert_eq!(store.get(&format!("k{}", i)).unwrap(), format!("v{}", i).as_bytes());
        }
    }
    compactor.join().unwrap();
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_corrupt_source_aborts_without_touching_live_state() {
    let (temp_dir, store) = setup_temp_store();
    store.set("good", b"fine").unwrap();
    store.set("bad", b"damaged").unwrap();
    store.rotate().unwrap();
    let generation = store.generation_dir();

    let path = generation.join("data_1.db");
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    let result = store.compact();

    assert!(matches!(result, Err(BytecaskError::CompactionAborted(_))));
    assert_eq!(store.compaction_state(), CompactionState::Aborted);
    assert_eq!(store.generation_dir(), generation);
    assert!(!temp_dir.path().join(".compaction").exists());
    assert_eq!(store.get("good").unwrap(), b"fine");

    // Writes keep working after an abort
    store.set("after", b"ok").unwrap();
    assert_eq!(store.get("after").unwrap(), b"ok");
}

#[test]
fn test_staging_leftovers_removed_on_open() {
    let temp_dir = TempDir::new().unwrap();
    {
        let store = Store::open_path(temp_dir.path()).unwrap();
        store.set("k", b"v").unwrap();
        store.shutdown().unwrap();
    }
    let staging = temp_dir.path().join(".compaction");
    fs::create_dir_all(&staging).unwrap();
    fs::write(staging.join("data_1.db"), b"partial").unwrap();

    let store = Store::open_path(temp_dir.path()).unwrap();

    assert!(!staging.exists());
    assert_eq!(store.get("k").unwrap(), b"v");
}
