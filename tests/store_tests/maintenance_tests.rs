//! Tests for the background maintenance loops
//!
//! These tests verify:
//! - Flush, rotation and compaction run on their own tickers
//! - Shutdown stops the loops and flushes the store
//! - Dropping the handle stops the loops but leaves the store usable

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytecask::{Config, Maintenance, Store};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn fast_config(dir: &std::path::Path) -> Config {
    Config::builder()
        .data_dir(dir)
        .max_datafile_size(512)
        .flush_interval(Duration::from_millis(20))
        .rotation_interval(Duration::from_millis(20))
        .compaction_interval(Duration::from_millis(50))
        .build()
}

fn slow_config(dir: &std::path::Path) -> Config {
    Config::builder()
        .data_dir(dir)
        .flush_interval(Duration::from_secs(3600))
        .rotation_interval(Duration::from_secs(3600))
        .compaction_interval(Duration::from_secs(3600))
        .build()
}

/// Poll `condition` until it holds or `timeout` passes
fn wait_for<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

// =============================================================================
// Loop Tests
// =============================================================================

#[test]
fn test_flush_loop_writes_hint() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(Store::open(fast_config(temp_dir.path())).unwrap());
    let maintenance = Maintenance::start(Arc::clone(&store)).unwrap();

    store.set("k", b"v").unwrap();

    assert!(wait_for(Duration::from_secs(5), || {
        store.generation_dir().join("key_hint.db").is_file()
    }));
    maintenance.shutdown().unwrap();
}

#[test]
fn test_rotation_and_compaction_loops() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(Store::open(fast_config(temp_dir.path())).unwrap());
    let maintenance = Maintenance::start(Arc::clone(&store)).unwrap();

    // Each value alone fills a datafile past its threshold
    for round in 0..5 {
        store.set("big", &vec![b'a' + round; 600]).unwrap();
        let (id, generation) = (store.active_file_id(), store.generation_dir());
        assert!(wait_for(Duration::from_secs(5), || {
            store.active_file_id() != id || store.generation_dir() != generation
        }));
    }

    assert!(wait_for(Duration::from_secs(5), || {
        !store.generation_dir().ends_with("generation_000001")
    }));
    assert_eq!(store.get("big").unwrap(), vec![b'a' + 4; 600]);

    maintenance.shutdown().unwrap();
}

// =============================================================================
// Shutdown Tests
// =============================================================================

#[test]
fn test_shutdown_stops_loops_and_store() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(Store::open(slow_config(temp_dir.path())).unwrap());
    let maintenance = Maintenance::start(Arc::clone(&store)).unwrap();
    store.set("k", b"v").unwrap();

    let started = Instant::now();
    maintenance.shutdown().unwrap();

    // Long tickers must not delay shutdown
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(store.is_shut_down());
    assert!(store.generation_dir().join("key_hint.db").is_file());

    drop(store);
    let reopened = Store::open_path(temp_dir.path()).unwrap();
    assert_eq!(reopened.get("k").unwrap(), b"v");
}

#[test]
fn test_drop_leaves_store_usable() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(Store::open(slow_config(temp_dir.path())).unwrap());
    {
        let _maintenance = Maintenance::start(Arc::clone(&store)).unwrap();
    }

    assert!(!store.is_shut_down());
    store.set("a", b"1").unwrap();
    store.rotate().unwrap();
    assert!(store.compact().is_ok());
    assert_eq!(store.get("a").unwrap(), b"1");
}
