//! Index Module
//!
//! Disk-resident hash map living directly in a [`BlockFile`], next to
//! whatever else the file holds. Maps serializable keys to serializable
//! values, used to find the head of an interning chain from a content hash.
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌────────────────────┐
//! │  Map Header  │────►│ Table Header Block│────►│ Table Block        │
//! │  (32 bytes)  │     │ 1024 x location   │     │ 1024 x bucket head │
//! └──────────────┘     └───────────────────┘     └─────────┬──────────┘
//!                                                          ▼
//!                                     Record ──next──► Record ──► 0
//! ```
//!
//! [`BlockFile`]: crate::storage::BlockFile

mod hash_map;

pub use hash_map::{DiskHashMap, Entries, MAP_HEADER_SIZE, MAX_TABLE_SIZE, RECORD_HEADER_SIZE};
