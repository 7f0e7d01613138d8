//! Error types for pagestore
//!
//! Provides a unified error type for all operations.
//!
//! Two kinds of failure exist:
//! - storage-format errors (bad magic/version, checksum mismatch, bad keys,
//!   write to read-only, ...), unrecoverable for the affected page or file
//! - I/O errors from the underlying filesystem
//!
//! Neither kind is retried internally.

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for pagestore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // File Format Errors
    // -------------------------------------------------------------------------
    #[error("Unsupported backing file: magic {found:#010x}, expected {expected:#010x}")]
    BadMagic { found: u32, expected: u32 },

    #[error("Unsupported layout version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Page checksum verification failed on load (block {block})")]
    ChecksumMismatch { block: u64 },

    #[error("Corrupted storage: {0}")]
    Corrupted(String),

    // -------------------------------------------------------------------------
    // Entry Errors
    // -------------------------------------------------------------------------
    #[error("Invalid key: {0:#x}")]
    InvalidKey(u64),

    #[error("The entry for key {0:#x} has already been removed")]
    EntryRemoved(u64),

    #[error("Entry of {size} bytes is too large (max {max})")]
    EntryTooLarge { size: usize, max: usize },

    #[error("Page cannot store an entry of {0} bytes")]
    PageFull(usize),

    // -------------------------------------------------------------------------
    // Access Errors
    // -------------------------------------------------------------------------
    #[error("The store is read only")]
    ReadOnly,

    #[error("Access of {length} bytes at offset {offset} is outside the window of {window} bytes")]
    OutOfBounds {
        offset: u64,
        length: u64,
        window: u64,
    },

    #[error("Access of {width} bytes at location {location} straddles a block boundary")]
    StraddlesBlock { location: u64, width: usize },

    #[error("No I/O proxy available (all {0} are in use)")]
    PoolExhausted(usize),

    #[error("The store has been closed")]
    Closed,

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Whether this is a storage-format error rather than an I/O failure
    pub fn is_format_error(&self) -> bool {
        !matches!(self, StoreError::Io(_))
    }
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
