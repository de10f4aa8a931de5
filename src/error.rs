//! Error types for Bytecask
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using BytecaskError
pub type Result<T> = std::result::Result<T, BytecaskError>;

/// Unified error type for Bytecask operations
#[derive(Debug, Error)]
pub enum BytecaskError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Record / Datafile Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt record header: {0}")]
    CorruptHeader(String),

    #[error("Corrupt record: checksum mismatch (expected {expected:#010x}, got {actual:#010x})")]
    CorruptRecord { expected: u32, actual: u32 },

    #[error("Corrupt record key: {0}")]
    CorruptKey(String),

    #[error("Refusing to append an empty record")]
    EmptyWrite,

    /// The datafile was closed by a compaction swap while a read was resolving it.
    #[error("Datafile {file_id} was closed; retry the read")]
    StaleHandle { file_id: u32 },

    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    KeyNotFound,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Recovery failed: {0}")]
    Recovery(String),

    #[error("Compaction aborted: {0}")]
    CompactionAborted(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BytecaskError {
    /// True for errors a caller may resolve by simply retrying the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BytecaskError::StaleHandle { .. })
    }

    /// True when the error signals an absent (or deleted) key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BytecaskError::KeyNotFound)
    }
}

impl From<bincode::Error> for BytecaskError {
    fn from(err: bincode::Error) -> Self {
        BytecaskError::Serialization(err.to_string())
    }
}
