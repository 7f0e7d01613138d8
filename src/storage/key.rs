//! Entry keys
//!
//! ```text
//! ┌──────────────────────────┬────────────────┬────────────────┐
//! │ File radical (32 bits)   │ Block (16 bits)│ Entry (16 bits)│
//! └──────────────────────────┴────────────────┴────────────────┘
//!                            └────────── short key ───────────┘
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Stored value meaning "no key" (-1 as a signed 64-bit integer)
pub const KEY_NULL: u64 = u64::MAX;

/// A valid key to an entry of a [`FileStore`](super::FileStore)
///
/// The raw value is always strictly positive when read as a signed
/// 64-bit integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryKey(u64);

impl EntryKey {
    /// Validate a raw key
    pub fn new(raw: u64) -> Result<Self> {
        if (raw as i64) <= 0 {
            return Err(StoreError::InvalidKey(raw));
        }
        Ok(Self(raw))
    }

    /// Build a key from a file radical and a short key
    pub fn from_parts(radical: u32, short_key: u32) -> Result<Self> {
        Self::new(((radical as u64) << 32) | short_key as u64)
    }

    /// Build a short key from a block index and an entry index
    pub fn short_key_for(block: u16, entry: u16) -> u32 {
        ((block as u32) << 16) | entry as u32
    }

    /// Decode a key read from storage; [`KEY_NULL`] means absent
    pub fn from_stored(raw: u64) -> Result<Option<Self>> {
        if raw == KEY_NULL {
            return Ok(None);
        }
        Self::new(raw).map(Some)
    }

    /// Encode an optional key for storage
    pub fn to_stored(key: Option<Self>) -> u64 {
        key.map_or(KEY_NULL, |k| k.0)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Index of the physical file holding the entry
    pub fn radical(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Key within the physical file
    pub fn short_key(&self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }

    pub fn block_index(&self) -> u16 {
        (self.short_key() >> 16) as u16
    }

    pub fn entry_index(&self) -> u16 {
        (self.short_key() & 0xFFFF) as u16
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl TryFrom<u64> for EntryKey {
    type Error = StoreError;

    fn try_from(raw: u64) -> Result<Self> {
        Self::new(raw)
    }
}

impl From<EntryKey> for u64 {
    fn from(key: EntryKey) -> u64 {
        key.0
    }
}
