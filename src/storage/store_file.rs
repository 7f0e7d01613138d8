//! Store File
//!
//! One physical file of a [`FileStore`](super::FileStore): a header block
//! followed by pages. Allocates entries, resolves short keys to locations
//! and keeps the open-block list of the header current.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::io::IoProxy;

use super::block_file::BlockFile;
use super::header::FileHeader;
use super::key::EntryKey;
use super::page::{Page, PageHooks, FLAG_REUSE_EMPTY_ENTRIES};
use super::{BLOCK_SIZE, THRESHOLD_BLOCK_FULL};

/// Summary of one physical file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStats {
    /// File index, the high 32 bits of its keys
    pub radical: u32,
    pub path: PathBuf,
    /// Allocated blocks, header included
    pub block_count: u32,
    /// Live entries over every page
    pub entry_count: u64,
    /// Open-list pairs (block index, remaining bytes), oldest first
    pub open_blocks: Vec<(u32, u32)>,
}

/// A page that failed verification
#[derive(Debug)]
pub struct PageFailure {
    pub radical: u32,
    pub block: u32,
    pub error: StoreError,
}

/// One physical file of a store
pub struct StoreFile {
    radical: u32,
    file: BlockFile<PageHooks>,
    max_blocks: u32,
    page_flags: u16,
}

impl StoreFile {
    /// Open a store file, writing a fresh header when the file is empty
    pub fn open(path: &Path, radical: u32, config: &Config) -> Result<Self> {
        let file = BlockFile::open(
            path,
            config.read_only,
            config.block_cache_capacity,
            config.proxy_pool_capacity,
            PageHooks,
        )?;
        let page_flags = if config.reuse_empty_entries {
            FLAG_REUSE_EMPTY_ENTRIES
        } else {
            0
        };
        let mut store = Self {
            radical,
            file,
            max_blocks: config.max_blocks_per_file,
            page_flags,
        };

        if store.file.size() == 0 {
            if store.file.is_read_only() {
                return Err(StoreError::Corrupted(format!(
                    "{} is empty and cannot be initialized read-only",
                    path.display()
                )));
            }
            FileHeader::new(store.file.block_mut(0)?).initialize();
        } else {
            FileHeader::new(store.file.block(0)?).validate()?;
        }
        Ok(store)
    }

    pub fn radical(&self) -> u32 {
        self.radical
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn is_read_only(&self) -> bool {
        self.file.is_read_only()
    }

    fn header(&mut self) -> Result<FileHeader<&[u8]>> {
        Ok(FileHeader::new(self.file.block(0)?))
    }

    fn header_mut(&mut self) -> Result<FileHeader<&mut [u8]>> {
        Ok(FileHeader::new(self.file.block_mut(0)?))
    }

    /// Whether no data block was ever allocated
    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.header()?.next_free_block() <= 1)
    }

    fn full_key(&self, short_key: u32) -> u64 {
        ((self.radical as u64) << 32) | short_key as u64
    }

    fn free_space(&mut self, block: u32) -> Result<usize> {
        Ok(Page::new(self.file.block(block as u64)?).free_space())
    }

    fn register(&mut self, block: u32, size: usize) -> Result<u32> {
        let (entry, _) = Page::new(self.file.block_mut(block as u64)?).register_entry(size)?;
        Ok(EntryKey::short_key_for(block as u16, entry))
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Reserve an entry of `size` bytes
    ///
    /// Returns the short key of the entry, or `None` when every block index
    /// of this file is in use and no open block can take the entry.
    pub fn allocate(&mut self, size: usize) -> Result<Option<u32>> {
        let candidates = self.header()?.open_blocks();
        for (position, (block, remaining)) in candidates.into_iter().enumerate() {
            if (remaining as usize) < size {
                continue;
            }
            // the recorded space is optimistic, the page has the final word
            if !Page::new(self.file.block(block as u64)?).can_store(size) {
                continue;
            }
            let short_key = self.register(block, size)?;
            let left = self.free_space(block)?;
            let mut header = self.header_mut()?;
            if left < THRESHOLD_BLOCK_FULL {
                header.remove_open(position);
            } else {
                header.update_open(position, left as u32);
            }
            return Ok(Some(short_key));
        }

        let block = self.header()?.next_free_block();
        if block >= self.max_blocks {
            return Ok(None);
        }
        Page::new(self.file.block_mut(block as u64)?).initialize(self.page_flags);
        let short_key = self.register(block, size)?;
        let left = self.free_space(block)?;
        let mut header = self.header_mut()?;
        header.set_next_free_block(block + 1);
        if left >= THRESHOLD_BLOCK_FULL {
            header.push_open(block, left as u32);
        }
        tracing::trace!(radical = self.radical, block, "allocated new block");
        Ok(Some(short_key))
    }

    /// Location in the file and length of an entry
    pub fn locate(&mut self, short_key: u32) -> Result<(u64, usize)> {
        let key = self.full_key(short_key);
        let block = short_key >> 16;
        let entry = (short_key & 0xFFFF) as u16;
        if block == 0 || block >= self.header()?.next_free_block() {
            return Err(StoreError::InvalidKey(key));
        }
        let (offset, length) = Page::new(self.file.block(block as u64)?).position_for(entry, key)?;
        Ok((block as u64 * BLOCK_SIZE as u64 + offset as u64, length))
    }

    /// Proxy over exactly the bytes of an entry
    pub fn access(&mut self, short_key: u32, writable: bool) -> Result<IoProxy<'_, PageHooks>> {
        let (location, length) = self.locate(short_key)?;
        IoProxy::begin(&mut self.file, location, length as u64, writable)
    }

    /// Free an entry, returning the length of its slot
    pub fn remove(&mut self, short_key: u32) -> Result<usize> {
        if self.file.is_read_only() {
            return Err(StoreError::ReadOnly);
        }
        self.locate(short_key)?;
        let key = self.full_key(short_key);
        let block = short_key >> 16;
        let entry = (short_key & 0xFFFF) as u16;

        let length = Page::new(self.file.block_mut(block as u64)?).remove_entry(entry, key)?;
        let left = self.free_space(block)?;
        let mut header = self.header_mut()?;
        match header.find_open(block) {
            Some(position) => header.update_open(position, left as u32),
            None if left >= THRESHOLD_BLOCK_FULL => header.push_open(block, left as u32),
            None => {}
        }
        Ok(length)
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    pub fn commit(&mut self) -> Result<usize> {
        self.file.commit()
    }

    pub fn rollback(&mut self) -> Result<usize> {
        let discarded = self.file.rollback()?;
        // a file that never reached the disk needs its header back
        if self.file.disk_size() == 0 && !self.file.is_read_only() {
            FileHeader::new(self.file.block_mut(0)?).initialize();
        }
        Ok(discarded)
    }

    pub fn close(self) -> Result<()> {
        self.file.close()
    }

    /// Bytes committed to disk
    pub fn disk_size(&self) -> u64 {
        self.file.disk_size()
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    pub fn stats(&mut self) -> Result<FileStats> {
        let header = self.header()?;
        let block_count = header.next_free_block();
        let open_blocks = header.open_blocks();
        let mut entry_count = 0u64;
        for block in 1..block_count {
            entry_count += Page::new(self.file.block(block as u64)?).entry_count() as u64;
        }
        Ok(FileStats {
            radical: self.radical,
            path: self.file.path().to_path_buf(),
            block_count,
            entry_count,
            open_blocks,
        })
    }

    /// Re-read every committed page from disk, collecting the ones failing
    /// verification
    ///
    /// Cached copies are not trusted. I/O errors abort the scan.
    pub fn verify(&mut self) -> Result<Vec<PageFailure>> {
        let block_count = self.header()?.next_free_block();
        let mut failures = Vec::new();
        for block in 1..block_count {
            match self.file.check_on_disk(block as u64) {
                Ok(_) => {}
                Err(error) if error.is_format_error() => failures.push(PageFailure {
                    radical: self.radical,
                    block,
                    error,
                }),
                Err(error) => return Err(error),
            }
        }
        Ok(failures)
    }
}
