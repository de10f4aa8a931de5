//! # Bytecask
//!
//! An embeddable, log-structured key-value store in the Bitcask tradition:
//! - Append-only datafiles with checksummed records
//! - In-memory key directory pointing at the latest record of every key
//! - Hint file snapshots for fast restarts
//! - Background flush, rotation and compaction
//! - Line-oriented TCP protocol
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                             │
//! │              (worker pool, text protocol)                   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Store                                │
//! │          (KeyDir + FileDir behind one lock)                 │
//! └──────────┬──────────────────────────────────┬───────────────┘
//!            │                                  │
//!            ▼                                  ▼
//!   ┌─────────────────┐               ┌───────────────────┐
//!   │    Datafiles    │               │    Maintenance    │
//!   │ (append / read) │◀──────────────│ flush · rotate ·  │
//!   └─────────────────┘               │     compact       │
//!                                     └───────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use bytecask::{Config, Store};
//!
//! let store = Store::open(Config::builder().data_dir("./data").build())?;
//! store.set("name", b"bytecask")?;
//! assert_eq!(store.get("name")?, b"bytecask");
//! store.shutdown()?;
//! # Ok::<(), bytecask::BytecaskError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod datafile;
pub mod keydir;
pub mod network;
pub mod protocol;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{Config, RecoveryMode};
pub use error::{BytecaskError, Result};
pub use store::{Maintenance, Store};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Bytecask
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
