//! # pagestore
//!
//! A block-structured persistent storage engine with:
//! - Fixed-size blocks cached in memory, committed with fsync
//! - SHA-1 checksummed pages holding variable-length entries
//! - Stable 64-bit keys spanning several physical files
//! - A disk-resident hash map for auxiliary indexes
//! - A node interning layer deduplicating strings and literals
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        NodeStore                            │
//! │          (interning, refcounts, cached node handles)        │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │                              │
//!                ▼                              ▼
//!   ┌─────────────────────────┐     ┌─────────────────────────┐
//!   │        FileStore        │     │       DiskHashMap       │
//!   │ (add/access/read/remove │     │  (string and literal    │
//!   │  rollover, commit)      │     │   bucket heads)         │
//!   └────────────┬────────────┘     └────────────┬────────────┘
//!                │                               │
//!                ▼                               │
//!   ┌─────────────────────────┐                  │
//!   │  StoreFile + Page       │                  │
//!   │  (header, open blocks,  │                  │
//!   │   entry tables, SHA-1)  │                  │
//!   └────────────┬────────────┘                  │
//!                ▼                               ▼
//!   ┌─────────────────────────────────────────────────────────┐
//!   │           BlockFile + BlockCache  ◄──  IoProxy          │
//!   │        (8 KiB blocks, dirty tracking, typed access)     │
//!   └─────────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod io;
pub mod storage;
pub mod index;
pub mod nodes;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StoreError};
pub use config::{Config, ConfigBuilder};
pub use storage::{EntryKey, FileStore};
pub use nodes::{Node, NodeStore};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of pagestore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
