//! Storage Module
//!
//! Block-structured persistent storage: fixed-size blocks, checksummed
//! pages holding variable-length entries, and a multi-file store handing
//! out stable 64-bit keys.
//!
//! ## Responsibilities
//! - Cache blocks in memory and track dirtiness per block
//! - Allocate, locate and free entries inside pages
//! - Keep a bounded list of blocks with spare capacity (open blocks)
//! - Roll over to a new physical file when the block index space is full
//! - Commit (flush + fsync) and rollback (reload from disk)
//!
//! ## File Format
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │ Block 0: File Header (8192 bytes)                          │
//! │   Magic (4) | Version (4) | OpenCount (4) | NextFree (4)   │
//! │   [BlockIndex (4) | Remaining (4)] x up to 1022            │
//! ├────────────────────────────────────────────────────────────┤
//! │ Block 1..N: Pages (8192 bytes each)                        │
//! │ ┌────────────────────────────────────────────────────────┐ │
//! │ │ Version(2) Flags(2) SHA-1(20) Count(2) Free(2) Data(2) │ │
//! │ ├────────────────────────────────────────────────────────┤ │
//! │ │ Entry table: [Offset(2) | Length(2)] ... grows ↓       │ │
//! │ │                    free space                          │ │
//! │ │ Entry data ...                           grows ↑       │ │
//! │ └────────────────────────────────────────────────────────┘ │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! All multi-byte values are big-endian.

mod block_file;
mod cache;
mod file_store;
mod header;
mod key;
mod page;
mod store_file;

pub use block_file::{BlockFile, BlockHooks, NoHooks};
pub use cache::BlockCache;
pub use file_store::FileStore;
pub use header::{FileHeader, FILE_LAYOUT_VERSION, FILE_MAGIC, MAX_OPEN_BLOCKS};
pub use key::{EntryKey, KEY_NULL};
pub use page::{
    Page, PageHooks, FLAG_REUSE_EMPTY_ENTRIES, MAX_ENTRY_SIZE, PAGE_ENTRY_SIZE,
    PAGE_HEADER_SIZE, PAGE_LAYOUT_VERSION,
};
pub use store_file::{FileStats, PageFailure, StoreFile};

// =============================================================================
// Shared Constants
// =============================================================================

/// Number of bits addressing a byte within a block
pub const BLOCK_INDEX_LENGTH: u32 = 13;

/// Size of a block in bytes
pub const BLOCK_SIZE: usize = 1 << BLOCK_INDEX_LENGTH;

/// Maximum number of blocks in one physical file (16-bit block index)
pub const MAX_BLOCKS_PER_FILE: u32 = 1 << 16;

/// Remaining bytes below which a block is no longer listed as open
pub const THRESHOLD_BLOCK_FULL: usize = 24;
