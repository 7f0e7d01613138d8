//! Page
//!
//! A block holding variable-length entries.
//!
//! ## Layout
//! ```text
//! ┌─────────┬───────┬──────────┬───────┬───────────┬───────────┐
//! │ Version │ Flags │  SHA-1   │ Count │ FreeStart │ DataStart │  30 bytes
//! │   (2)   │  (2)  │   (20)   │  (2)  │    (2)    │    (2)    │
//! ├─────────┴───────┴──────────┴───────┴───────────┴───────────┤
//! │ Row 0: Offset (2) | Length (2)                              │
//! │ Row 1: ...                                  table grows ↓   │
//! │                                                             │
//! │                        free space                           │
//! │                                                             │
//! │                                             data grows ↑    │
//! │ ... Entry 1 data | Entry 0 data                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! `Count` is the number of live entries. The number of table rows is
//! `(FreeStart - 30) / 4`; a row with offset 0 is a tombstone. The digest
//! covers every byte after the header.

use bytes::{Buf, BufMut};
use sha1::{Digest, Sha1};

use crate::error::{Result, StoreError};

use super::block_file::BlockHooks;
use super::BLOCK_SIZE;

/// Current page layout version
pub const PAGE_LAYOUT_VERSION: u16 = 1;

/// Size of the page header
pub const PAGE_HEADER_SIZE: usize = 2 + 2 + 20 + 2 + 2 + 2;

/// Size of one entry table row
pub const PAGE_ENTRY_SIZE: usize = 2 + 2;

/// Largest entry a page can hold
pub const MAX_ENTRY_SIZE: usize = BLOCK_SIZE - PAGE_HEADER_SIZE - PAGE_ENTRY_SIZE;

/// Page flag: let new entries reuse tombstoned slots
pub const FLAG_REUSE_EMPTY_ENTRIES: u16 = 0x0001;

const OFFSET_VERSION: usize = 0;
const OFFSET_FLAGS: usize = 2;
const OFFSET_DIGEST: usize = 4;
const DIGEST_SIZE: usize = 20;
const OFFSET_ENTRY_COUNT: usize = 24;
const OFFSET_FREE_START: usize = 26;
const OFFSET_DATA_START: usize = 28;

/// View of a block as a page
///
/// Read operations need `B: AsRef<[u8]>`; mutations also need `AsMut<[u8]>`.
pub struct Page<B> {
    data: B,
}

impl<B: AsRef<[u8]>> Page<B> {
    pub fn new(data: B) -> Self {
        Self { data }
    }

    fn bytes(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn get_u16(&self, at: usize) -> u16 {
        (&self.bytes()[at..at + 2]).get_u16()
    }

    pub fn version(&self) -> u16 {
        self.get_u16(OFFSET_VERSION)
    }

    pub fn flags(&self) -> u16 {
        self.get_u16(OFFSET_FLAGS)
    }

    /// Stored SHA-1 digest of the post-header bytes
    pub fn digest(&self) -> &[u8] {
        &self.bytes()[OFFSET_DIGEST..OFFSET_DIGEST + DIGEST_SIZE]
    }

    /// Number of live entries
    pub fn entry_count(&self) -> u16 {
        self.get_u16(OFFSET_ENTRY_COUNT)
    }

    /// Offset of the first byte after the entry table
    pub fn free_start(&self) -> u16 {
        self.get_u16(OFFSET_FREE_START)
    }

    /// Offset of the lowest entry data
    pub fn data_start(&self) -> u16 {
        self.get_u16(OFFSET_DATA_START)
    }

    /// Number of rows in the entry table, tombstones included
    pub fn row_count(&self) -> usize {
        (self.free_start() as usize).saturating_sub(PAGE_HEADER_SIZE) / PAGE_ENTRY_SIZE
    }

    /// Offset and length stored in a table row
    pub fn row(&self, index: usize) -> (u16, u16) {
        let at = PAGE_HEADER_SIZE + index * PAGE_ENTRY_SIZE;
        (self.get_u16(at), self.get_u16(at + 2))
    }

    pub fn reuses_empty_entries(&self) -> bool {
        self.flags() & FLAG_REUSE_EMPTY_ENTRIES == FLAG_REUSE_EMPTY_ENTRIES
    }

    fn has_tombstones(&self) -> bool {
        self.row_count() > self.entry_count() as usize
    }

    /// First tombstoned row able to hold `length` bytes, with its data offset
    fn reusable_row(&self, length: usize) -> Option<(usize, u16)> {
        if !self.reuses_empty_entries() || !self.has_tombstones() {
            return None;
        }
        // slots are laid out from the block end in row order
        let mut data_end = BLOCK_SIZE;
        for index in 0..self.row_count() {
            let (offset, slot_length) = self.row(index);
            let slot_start = data_end - slot_length as usize;
            if offset == 0 && slot_length as usize >= length {
                return Some((index, slot_start as u16));
            }
            data_end = slot_start;
        }
        None
    }

    /// Bytes between the entry table and the data area
    fn contiguous_space(&self) -> usize {
        (self.data_start() as usize).saturating_sub(self.free_start() as usize)
    }

    /// Free space available for new entries
    ///
    /// Counts the contiguous space minus one table row, plus the bytes of
    /// every tombstoned slot when reuse is enabled. The sum is optimistic:
    /// one entry may not be able to use all of it.
    pub fn free_space(&self) -> usize {
        let mut free = self.contiguous_space().saturating_sub(PAGE_ENTRY_SIZE);
        if self.reuses_empty_entries() && self.has_tombstones() {
            free += (0..self.row_count())
                .map(|index| self.row(index))
                .filter(|&(offset, _)| offset == 0)
                .map(|(_, length)| length as usize)
                .sum::<usize>();
        }
        free
    }

    /// Whether an entry of `length` bytes fits in this page
    pub fn can_store(&self, length: usize) -> bool {
        if length > MAX_ENTRY_SIZE {
            return false;
        }
        if self.reusable_row(length).is_some() {
            return true;
        }
        self.contiguous_space() >= length + PAGE_ENTRY_SIZE
    }

    fn live_row(&self, entry: u16, key: u64) -> Result<(u16, u16)> {
        if entry as usize >= self.row_count() {
            return Err(StoreError::InvalidKey(key));
        }
        let (offset, length) = self.row(entry as usize);
        if offset == 0 {
            return Err(StoreError::EntryRemoved(key));
        }
        Ok((offset, length))
    }

    /// Offset within the block and length of an entry
    ///
    /// `key` is only used for error reporting. The length is the length of
    /// the slot, which for a reused slot may exceed the length requested
    /// when the entry was registered.
    pub fn position_for(&self, entry: u16, key: u64) -> Result<(usize, usize)> {
        let (offset, length) = self.live_row(entry, key)?;
        Ok((offset as usize, length as usize))
    }

    /// Whether every byte of the block is zero
    pub fn is_blank(&self) -> bool {
        self.bytes().iter().all(|&byte| byte == 0)
    }

    /// Check the layout version and the digest of the page
    pub fn verify(&self, block: u64) -> Result<()> {
        match self.version() {
            0 if self.is_blank() => Ok(()),
            0 => Err(StoreError::Corrupted(format!(
                "block {} has no layout version but is not empty",
                block
            ))),
            PAGE_LAYOUT_VERSION => {
                let computed = Sha1::digest(&self.bytes()[PAGE_HEADER_SIZE..]);
                if computed.as_slice() != self.digest() {
                    tracing::error!(block, "page checksum mismatch");
                    return Err(StoreError::ChecksumMismatch { block });
                }
                Ok(())
            }
            found => Err(StoreError::UnsupportedVersion {
                found: found as u32,
                expected: PAGE_LAYOUT_VERSION as u32,
            }),
        }
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Page<B> {
    fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }

    fn put_u16(&mut self, at: usize, value: u16) {
        (&mut self.bytes_mut()[at..at + 2]).put_u16(value);
    }

    fn set_entry_count(&mut self, value: u16) {
        self.put_u16(OFFSET_ENTRY_COUNT, value);
    }

    fn set_free_start(&mut self, value: u16) {
        self.put_u16(OFFSET_FREE_START, value);
    }

    fn set_data_start(&mut self, value: u16) {
        self.put_u16(OFFSET_DATA_START, value);
    }

    fn set_row(&mut self, index: usize, offset: u16, length: u16) {
        let at = PAGE_HEADER_SIZE + index * PAGE_ENTRY_SIZE;
        self.put_u16(at, offset);
        self.put_u16(at + 2, length);
    }

    /// Turn a block into an empty page
    pub fn initialize(&mut self, flags: u16) {
        self.bytes_mut().fill(0);
        self.put_u16(OFFSET_VERSION, PAGE_LAYOUT_VERSION);
        self.put_u16(OFFSET_FLAGS, flags);
        self.set_entry_count(0);
        self.set_free_start(PAGE_HEADER_SIZE as u16);
        self.set_data_start(BLOCK_SIZE as u16);
    }

    /// Reserve space for an entry of `length` bytes
    ///
    /// Returns the entry index and the offset of its data in the block.
    pub fn register_entry(&mut self, length: usize) -> Result<(u16, usize)> {
        if length > MAX_ENTRY_SIZE {
            return Err(StoreError::EntryTooLarge {
                size: length,
                max: MAX_ENTRY_SIZE,
            });
        }
        if let Some((index, offset)) = self.reusable_row(length) {
            let (_, slot_length) = self.row(index);
            self.set_row(index, offset, slot_length);
            let count = self.entry_count();
            self.set_entry_count(count + 1);
            return Ok((index as u16, offset as usize));
        }
        if self.contiguous_space() < length + PAGE_ENTRY_SIZE {
            return Err(StoreError::PageFull(length));
        }
        let index = self.row_count();
        let offset = self.data_start() as usize - length;
        self.set_row(index, offset as u16, length as u16);
        let count = self.entry_count();
        self.set_entry_count(count + 1);
        let free_start = self.free_start();
        self.set_free_start(free_start + PAGE_ENTRY_SIZE as u16);
        self.set_data_start(offset as u16);
        Ok((index as u16, offset))
    }

    /// Free an entry, returning the length of its slot
    ///
    /// The last row is dropped together with the tombstones right before
    /// it; any other row becomes a tombstone.
    pub fn remove_entry(&mut self, entry: u16, key: u64) -> Result<usize> {
        let (_, length) = self.live_row(entry, key)?;
        let count = self.entry_count();
        self.set_entry_count(count - 1);

        let last = self.row_count() - 1;
        if entry as usize != last {
            self.set_row(entry as usize, 0, length);
            return Ok(length as usize);
        }

        let mut rows = last;
        let mut data_start = self.data_start() + length;
        self.set_row(rows, 0, 0);
        while rows > 0 {
            let (offset, slot_length) = self.row(rows - 1);
            if offset != 0 {
                break;
            }
            rows -= 1;
            data_start += slot_length;
            self.set_row(rows, 0, 0);
        }
        self.set_free_start((PAGE_HEADER_SIZE + rows * PAGE_ENTRY_SIZE) as u16);
        self.set_data_start(data_start);
        Ok(length as usize)
    }

    /// Recompute the digest over the post-header bytes
    pub fn seal(&mut self) {
        let digest = Sha1::digest(&self.bytes()[PAGE_HEADER_SIZE..]);
        self.bytes_mut()[OFFSET_DIGEST..OFFSET_DIGEST + DIGEST_SIZE].copy_from_slice(&digest);
    }
}

/// Block hooks treating every block but the header as a page
#[derive(Debug, Default, Clone, Copy)]
pub struct PageHooks;

impl BlockHooks for PageHooks {
    fn on_load(&self, index: u64, data: &[u8]) -> Result<()> {
        if index == 0 {
            return Ok(());
        }
        Page::new(data).verify(index)
    }

    fn on_commit(&self, index: u64, data: &mut [u8]) {
        if index == 0 {
            return;
        }
        let mut page = Page::new(data);
        if page.version() != 0 {
            page.seal();
        }
    }
}
