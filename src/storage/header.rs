//! File Header
//!
//! Block 0 of every store file.
//!
//! ```text
//! ┌───────────┬───────────┬───────────┬───────────┐
//! │ Magic (4) │ Version(4)│ OpenCount │ NextFree  │
//! ├───────────┴───────────┼───────────┴───────────┤
//! │ BlockIndex (4)        │ Remaining (4)         │  x OpenCount
//! │ ...                   │                       │  (oldest first)
//! └───────────────────────┴───────────────────────┘
//! ```
//!
//! The open-block list names blocks with spare capacity. It is ordered by
//! insertion: when full, the first (stalest) pair is dropped.

use bytes::{Buf, BufMut};

use crate::error::{Result, StoreError};

use super::BLOCK_SIZE;

/// Magic number identifying a store file
pub const FILE_MAGIC: u32 = 0x0000_FF00;

/// Current file layout version
pub const FILE_LAYOUT_VERSION: u32 = 1;

const OFFSET_MAGIC: usize = 0;
const OFFSET_VERSION: usize = 4;
const OFFSET_OPEN_COUNT: usize = 8;
const OFFSET_NEXT_FREE: usize = 12;
const OFFSET_OPEN_BLOCKS: usize = 16;
const OPEN_BLOCK_SIZE: usize = 8;

/// Maximum number of blocks listed as open
pub const MAX_OPEN_BLOCKS: usize = (BLOCK_SIZE - OFFSET_OPEN_BLOCKS) / OPEN_BLOCK_SIZE;

/// View of block 0 as the file header
pub struct FileHeader<B> {
    data: B,
}

impl<B: AsRef<[u8]>> FileHeader<B> {
    pub fn new(data: B) -> Self {
        Self { data }
    }

    fn get_u32(&self, at: usize) -> u32 {
        (&self.data.as_ref()[at..at + 4]).get_u32()
    }

    pub fn magic(&self) -> u32 {
        self.get_u32(OFFSET_MAGIC)
    }

    pub fn version(&self) -> u32 {
        self.get_u32(OFFSET_VERSION)
    }

    /// Number of listed open blocks
    pub fn open_count(&self) -> usize {
        (self.get_u32(OFFSET_OPEN_COUNT) as usize).min(MAX_OPEN_BLOCKS)
    }

    /// Index of the first block never allocated
    pub fn next_free_block(&self) -> u32 {
        self.get_u32(OFFSET_NEXT_FREE)
    }

    /// Block index and remaining space of an open-list pair
    pub fn open_block(&self, position: usize) -> (u32, u32) {
        let at = OFFSET_OPEN_BLOCKS + position * OPEN_BLOCK_SIZE;
        (self.get_u32(at), self.get_u32(at + 4))
    }

    /// Every open-list pair, oldest first
    pub fn open_blocks(&self) -> Vec<(u32, u32)> {
        (0..self.open_count()).map(|i| self.open_block(i)).collect()
    }

    /// Position of a block in the open list
    pub fn find_open(&self, block: u32) -> Option<usize> {
        (0..self.open_count()).find(|&i| self.open_block(i).0 == block)
    }

    /// Check magic and layout version
    pub fn validate(&self) -> Result<()> {
        if self.magic() != FILE_MAGIC {
            return Err(StoreError::BadMagic {
                found: self.magic(),
                expected: FILE_MAGIC,
            });
        }
        if self.version() != FILE_LAYOUT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: self.version(),
                expected: FILE_LAYOUT_VERSION,
            });
        }
        if self.get_u32(OFFSET_OPEN_COUNT) as usize > MAX_OPEN_BLOCKS {
            return Err(StoreError::Corrupted(format!(
                "header lists {} open blocks",
                self.get_u32(OFFSET_OPEN_COUNT)
            )));
        }
        Ok(())
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> FileHeader<B> {
    fn put_u32(&mut self, at: usize, value: u32) {
        (&mut self.data.as_mut()[at..at + 4]).put_u32(value);
    }

    fn set_open_count(&mut self, count: usize) {
        self.put_u32(OFFSET_OPEN_COUNT, count as u32);
    }

    fn set_open_block(&mut self, position: usize, block: u32, remaining: u32) {
        let at = OFFSET_OPEN_BLOCKS + position * OPEN_BLOCK_SIZE;
        self.put_u32(at, block);
        self.put_u32(at + 4, remaining);
    }

    /// Write an empty header
    pub fn initialize(&mut self) {
        self.data.as_mut().fill(0);
        self.put_u32(OFFSET_MAGIC, FILE_MAGIC);
        self.put_u32(OFFSET_VERSION, FILE_LAYOUT_VERSION);
        self.set_open_count(0);
        self.set_next_free_block(1);
    }

    pub fn set_next_free_block(&mut self, block: u32) {
        self.put_u32(OFFSET_NEXT_FREE, block);
    }

    /// Append a block to the open list, dropping the stalest one when full
    pub fn push_open(&mut self, block: u32, remaining: u32) {
        let mut count = self.open_count();
        if count == MAX_OPEN_BLOCKS {
            self.remove_open(0);
            count -= 1;
        }
        self.set_open_block(count, block, remaining);
        self.set_open_count(count + 1);
    }

    /// Update the remaining space recorded for an open-list pair
    pub fn update_open(&mut self, position: usize, remaining: u32) {
        let (block, _) = self.open_block(position);
        self.set_open_block(position, block, remaining);
    }

    /// Drop a pair from the open list, keeping the order of the others
    pub fn remove_open(&mut self, position: usize) {
        let count = self.open_count();
        let start = OFFSET_OPEN_BLOCKS + (position + 1) * OPEN_BLOCK_SIZE;
        let end = OFFSET_OPEN_BLOCKS + count * OPEN_BLOCK_SIZE;
        self.data
            .as_mut()
            .copy_within(start..end, start - OPEN_BLOCK_SIZE);
        self.set_open_block(count - 1, 0, 0);
        self.set_open_count(count - 1);
    }
}
