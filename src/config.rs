//! Configuration for Bytecask
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{BytecaskError, Result};

/// Main configuration for a Bytecask instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── CURRENT                 (names the live generation)
    ///     ├── generation_000001/
    ///     │     ├── data_1.db
    ///     │     ├── data_2.db
    ///     │     └── key_hint.db
    ///     └── .compaction/            (staging, only while compacting)
    pub data_dir: PathBuf,

    /// fsync the active datafile after every append
    pub fsync_on_write: bool,

    /// Size at which a datafile is considered for rotation (in bytes)
    pub max_datafile_size: u64,

    /// Fraction of `max_datafile_size` at which a datafile reports full
    pub rotation_threshold: f64,

    // -------------------------------------------------------------------------
    // Maintenance Configuration
    // -------------------------------------------------------------------------
    /// How often the key directory is persisted and the active file synced
    pub flush_interval: Duration,

    /// How often compaction runs
    pub compaction_interval: Duration,

    /// How often the active datafile is checked for rotation
    pub rotation_interval: Duration,

    // -------------------------------------------------------------------------
    // Recovery Configuration
    // -------------------------------------------------------------------------
    /// How the key directory is rebuilt on startup
    pub recovery_mode: RecoveryMode,

    /// Attempts made to open each datafile before it counts as failed
    pub open_retries: u32,

    /// Datafiles that may fail to open before recovery gives up
    pub max_recovery_errors: u32,

    /// Read/checksum errors tolerated per datafile during a full scan
    pub max_scan_errors: u32,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections (worker pool size)
    pub max_connections: usize,

    /// Connection read timeout (milliseconds)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds)
    pub write_timeout_ms: u64,
}

/// Key directory rebuild strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryMode {
    /// Use the hint file when it is present and valid, otherwise scan
    Auto,

    /// Require the hint file; a missing or corrupt hint fails recovery
    Hint,

    /// Ignore the hint file and rebuild from every datafile
    Scan,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./bytecask_data"),
            fsync_on_write: false,
            max_datafile_size: 64 * 1024 * 1024, // 64 MB
            rotation_threshold: 0.95,
            flush_interval: Duration::from_secs(60),
            compaction_interval: Duration::from_secs(3 * 60),
            rotation_interval: Duration::from_secs(60),
            recovery_mode: RecoveryMode::Auto,
            open_retries: 3,
            max_recovery_errors: 0,
            max_scan_errors: 8,
            listen_addr: "127.0.0.1:6969".to_string(),
            max_connections: 128,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check option ranges before the store is opened
    pub fn validate(&self) -> Result<()> {
        if self.max_datafile_size == 0 || self.max_datafile_size > u32::MAX as u64 {
            return Err(BytecaskError::Config(format!(
                "max_datafile_size must be in 1..={}, got {}",
                u32::MAX,
                self.max_datafile_size
            )));
        }
        if !(self.rotation_threshold > 0.0 && self.rotation_threshold <= 1.0) {
            return Err(BytecaskError::Config(format!(
                "rotation_threshold must be in (0, 1], got {}",
                self.rotation_threshold
            )));
        }
        for (name, interval) in [
            ("flush_interval", self.flush_interval),
            ("compaction_interval", self.compaction_interval),
            ("rotation_interval", self.rotation_interval),
        ] {
            if interval.is_zero() {
                return Err(BytecaskError::Config(format!("{} must be non-zero", name)));
            }
        }
        if self.open_retries == 0 {
            return Err(BytecaskError::Config("open_retries must be at least 1".to_string()));
        }
        if self.max_connections == 0 {
            return Err(BytecaskError::Config("max_connections must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Sync the active datafile after every write
    pub fn fsync_on_write(mut self, enabled: bool) -> Self {
        self.config.fsync_on_write = enabled;
        self
    }

    /// Set the maximum datafile size (in bytes)
    pub fn max_datafile_size(mut self, size: u64) -> Self {
        self.config.max_datafile_size = size;
        self
    }

    /// Set the fraction of the maximum size at which rotation happens
    pub fn rotation_threshold(mut self, fraction: f64) -> Self {
        self.config.rotation_threshold = fraction;
        self
    }

    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.config.flush_interval = interval;
        self
    }

    pub fn compaction_interval(mut self, interval: Duration) -> Self {
        self.config.compaction_interval = interval;
        self
    }

    pub fn rotation_interval(mut self, interval: Duration) -> Self {
        self.config.rotation_interval = interval;
        self
    }

    /// Set how the key directory is rebuilt on startup
    pub fn recovery_mode(mut self, mode: RecoveryMode) -> Self {
        self.config.recovery_mode = mode;
        self
    }

    pub fn open_retries(mut self, retries: u32) -> Self {
        self.config.open_retries = retries;
        self
    }

    pub fn max_recovery_errors(mut self, count: u32) -> Self {
        self.config.max_recovery_errors = count;
        self
    }

    pub fn max_scan_errors(mut self, count: u32) -> Self {
        self.config.max_scan_errors = count;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
