//! Block File
//!
//! One physical file seen as a sequence of fixed-size blocks.
//!
//! ## Responsibilities
//! - Map block index ↔ byte offset
//! - Keep recently touched blocks in a [`BlockCache`]
//! - Typed primitive access (u8, u16, i32, i64, f32, f64, byte ranges)
//! - Commit: run the commit hook on dirty blocks, write them, fsync
//! - Rollback: reload dirty blocks from disk, forget never-written ones
//!
//! Fixed-size primitives must sit inside one block: an access crossing a
//! block boundary fails with [`StoreError::StraddlesBlock`]. Byte ranges
//! may span several blocks.
//!
//! Not safe for concurrent use; every method takes `&mut self`.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, StoreError};
use crate::io::ProxyPool;

use super::cache::BlockCache;
use super::BLOCK_SIZE;

const BLOCK: u64 = BLOCK_SIZE as u64;

/// Hooks run by a [`BlockFile`] around disk transfers
pub trait BlockHooks {
    /// Called on every block read from disk, before it enters the cache
    fn on_load(&self, index: u64, data: &[u8]) -> Result<()>;

    /// Called on every dirty block right before it is written
    fn on_commit(&self, index: u64, data: &mut [u8]);
}

/// Hooks doing nothing, for files without page structure
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl BlockHooks for NoHooks {
    fn on_load(&self, _index: u64, _data: &[u8]) -> Result<()> {
        Ok(())
    }

    fn on_commit(&self, _index: u64, _data: &mut [u8]) {}
}

/// A file of fixed-size blocks with an in-memory block cache
pub struct BlockFile<H = NoHooks> {
    /// Path of the backing file
    path: PathBuf,
    /// Backing file handle
    file: File,
    /// Whether writes are refused
    read_only: bool,
    /// Load/commit hooks
    hooks: H,
    /// Loaded blocks
    cache: BlockCache,
    /// Pool of proxies bound to this file
    pool: ProxyPool,
    /// Bytes known to be on disk (committed)
    disk_size: u64,
    /// Logical size, including blocks not yet committed
    size: u64,
}

impl<H: BlockHooks> BlockFile<H> {
    /// Open or create a block file
    ///
    /// A file without write permission is opened read-only regardless of
    /// `read_only`.
    pub fn open(
        path: &Path,
        read_only: bool,
        cache_capacity: usize,
        pool_capacity: usize,
        hooks: H,
    ) -> Result<Self> {
        let write_protected = path
            .metadata()
            .map(|meta| meta.permissions().readonly())
            .unwrap_or(false);
        let read_only = read_only || write_protected;

        let file = if read_only {
            OpenOptions::new().read(true).open(path)?
        } else {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(path)?
        };

        let disk_size = file.metadata()?.len();
        let size = round_up(disk_size);

        tracing::debug!(
            path = %path.display(),
            size = disk_size,
            read_only,
            "opened block file"
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            read_only,
            hooks,
            cache: BlockCache::new(cache_capacity),
            pool: ProxyPool::new(pool_capacity),
            disk_size,
            size,
        })
    }

    // =========================================================================
    // Block Access
    // =========================================================================

    /// Get the content of a block
    pub fn block(&mut self, index: u64) -> Result<&[u8]> {
        let offset = index * BLOCK;
        if offset >= self.size {
            return Err(StoreError::OutOfBounds {
                offset,
                length: BLOCK,
                window: self.size,
            });
        }
        let slot = self.load(index)?;
        Ok(&self.cache.slot(slot).data[..])
    }

    /// Get the content of a block for modification, marking it dirty
    ///
    /// Blocks past the end of the file are created zeroed.
    pub fn block_mut(&mut self, index: u64) -> Result<&mut [u8]> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        self.size = self.size.max((index + 1) * BLOCK);
        let slot = self.load(index)?;
        let block = self.cache.slot_mut(slot);
        block.dirty = true;
        Ok(&mut block.data[..])
    }

    /// Append a new zeroed block at the end of the file
    pub fn allocate_block(&mut self) -> Result<u64> {
        let index = self.size / BLOCK;
        self.block_mut(index)?;
        Ok(index)
    }

    fn load(&mut self, index: u64) -> Result<usize> {
        if let Some(slot) = self.cache.touch(index) {
            return Ok(slot);
        }
        let data = self.read_from_disk(index)?;
        Ok(self.cache.insert(index, data))
    }

    fn read_from_disk(&mut self, index: u64) -> Result<BytesMut> {
        let mut data = BytesMut::zeroed(BLOCK_SIZE);
        let offset = index * BLOCK;
        // blocks that never reached the disk need no physical read
        if offset < self.disk_size {
            let available = (self.disk_size - offset).min(BLOCK) as usize;
            self.file.seek(SeekFrom::Start(offset))?;
            self.file.read_exact(&mut data[..available])?;
            self.hooks.on_load(index, &data)?;
        }
        Ok(data)
    }

    /// Re-read the committed bytes of a block and run the load hook on them
    ///
    /// The cache is bypassed and left as it is. A block that never reached
    /// the disk passes.
    pub fn check_on_disk(&mut self, index: u64) -> Result<()> {
        self.read_from_disk(index).map(|_| ())
    }

    // =========================================================================
    // Typed Primitives
    // =========================================================================

    fn span(&mut self, location: u64, width: usize) -> Result<&[u8]> {
        let within = check_within_block(location, width)?;
        if location + width as u64 > self.size {
            return Err(StoreError::OutOfBounds {
                offset: location,
                length: width as u64,
                window: self.size,
            });
        }
        let block = self.block(location / BLOCK)?;
        Ok(&block[within..within + width])
    }

    fn span_mut(&mut self, location: u64, width: usize) -> Result<&mut [u8]> {
        let within = check_within_block(location, width)?;
        let block = self.block_mut(location / BLOCK)?;
        Ok(&mut block[within..within + width])
    }

    pub fn read_u8(&mut self, location: u64) -> Result<u8> {
        let mut bytes = self.span(location, 1)?;
        Ok(bytes.get_u8())
    }

    /// Read a 2-byte unsigned value
    pub fn read_u16(&mut self, location: u64) -> Result<u16> {
        let mut bytes = self.span(location, 2)?;
        Ok(bytes.get_u16())
    }

    pub fn read_i32(&mut self, location: u64) -> Result<i32> {
        let mut bytes = self.span(location, 4)?;
        Ok(bytes.get_i32())
    }

    pub fn read_u32(&mut self, location: u64) -> Result<u32> {
        let mut bytes = self.span(location, 4)?;
        Ok(bytes.get_u32())
    }

    pub fn read_i64(&mut self, location: u64) -> Result<i64> {
        let mut bytes = self.span(location, 8)?;
        Ok(bytes.get_i64())
    }

    pub fn read_u64(&mut self, location: u64) -> Result<u64> {
        let mut bytes = self.span(location, 8)?;
        Ok(bytes.get_u64())
    }

    pub fn read_f32(&mut self, location: u64) -> Result<f32> {
        let mut bytes = self.span(location, 4)?;
        Ok(bytes.get_f32())
    }

    pub fn read_f64(&mut self, location: u64) -> Result<f64> {
        let mut bytes = self.span(location, 8)?;
        Ok(bytes.get_f64())
    }

    pub fn write_u8(&mut self, location: u64, value: u8) -> Result<()> {
        let mut bytes = self.span_mut(location, 1)?;
        bytes.put_u8(value);
        Ok(())
    }

    pub fn write_u16(&mut self, location: u64, value: u16) -> Result<()> {
        let mut bytes = self.span_mut(location, 2)?;
        bytes.put_u16(value);
        Ok(())
    }

    pub fn write_i32(&mut self, location: u64, value: i32) -> Result<()> {
        let mut bytes = self.span_mut(location, 4)?;
        bytes.put_i32(value);
        Ok(())
    }

    pub fn write_u32(&mut self, location: u64, value: u32) -> Result<()> {
        let mut bytes = self.span_mut(location, 4)?;
        bytes.put_u32(value);
        Ok(())
    }

    pub fn write_i64(&mut self, location: u64, value: i64) -> Result<()> {
        let mut bytes = self.span_mut(location, 8)?;
        bytes.put_i64(value);
        Ok(())
    }

    pub fn write_u64(&mut self, location: u64, value: u64) -> Result<()> {
        let mut bytes = self.span_mut(location, 8)?;
        bytes.put_u64(value);
        Ok(())
    }

    pub fn write_f32(&mut self, location: u64, value: f32) -> Result<()> {
        let mut bytes = self.span_mut(location, 4)?;
        bytes.put_f32(value);
        Ok(())
    }

    pub fn write_f64(&mut self, location: u64, value: f64) -> Result<()> {
        let mut bytes = self.span_mut(location, 8)?;
        bytes.put_f64(value);
        Ok(())
    }

    /// Fill `buffer` with the bytes starting at `location`, across blocks
    pub fn read_bytes(&mut self, location: u64, buffer: &mut [u8]) -> Result<()> {
        if location + buffer.len() as u64 > self.size {
            return Err(StoreError::OutOfBounds {
                offset: location,
                length: buffer.len() as u64,
                window: self.size,
            });
        }
        let mut done = 0;
        while done < buffer.len() {
            let current = location + done as u64;
            let within = (current % BLOCK) as usize;
            let count = (BLOCK_SIZE - within).min(buffer.len() - done);
            let block = self.block(current / BLOCK)?;
            buffer[done..done + count].copy_from_slice(&block[within..within + count]);
            done += count;
        }
        Ok(())
    }

    /// Write `value` starting at `location`, across blocks
    pub fn write_bytes(&mut self, location: u64, value: &[u8]) -> Result<()> {
        let mut done = 0;
        while done < value.len() {
            let current = location + done as u64;
            let within = (current % BLOCK) as usize;
            let count = (BLOCK_SIZE - within).min(value.len() - done);
            let block = self.block_mut(current / BLOCK)?;
            block[within..within + count].copy_from_slice(&value[done..done + count]);
            done += count;
        }
        Ok(())
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Write every dirty block to disk, then fsync
    ///
    /// Returns the number of blocks written. Blocks are written one by one:
    /// a crash in the middle leaves a mix of old and new pages on disk.
    pub fn commit(&mut self) -> Result<usize> {
        if self.read_only {
            return Ok(0);
        }
        let dirty = self.cache.dirty_slots();
        for &slot in &dirty {
            let block = self.cache.slot_mut(slot);
            self.hooks.on_commit(block.index, &mut block.data[..]);
            let offset = block.index * BLOCK;
            self.file.seek(SeekFrom::Start(offset))?;
            self.file.write_all(&block.data[..])?;
            block.dirty = false;
            self.disk_size = self.disk_size.max(offset + BLOCK);
        }
        self.file.sync_all()?;
        tracing::debug!(path = %self.path.display(), blocks = dirty.len(), "committed block file");
        Ok(dirty.len())
    }

    /// Discard every uncommitted change
    ///
    /// Returns the number of blocks discarded.
    pub fn rollback(&mut self) -> Result<usize> {
        let indices: Vec<u64> = self
            .cache
            .dirty_slots()
            .into_iter()
            .map(|slot| self.cache.slot(slot).index)
            .collect();
        for &index in &indices {
            self.cache.remove(index);
        }
        self.size = round_up(self.disk_size);
        for &index in &indices {
            if index * BLOCK < self.disk_size {
                self.load(index)?;
            }
        }
        tracing::debug!(path = %self.path.display(), blocks = indices.len(), "rolled back block file");
        Ok(indices.len())
    }

    /// Drop every block, on disk and in memory
    pub fn truncate(&mut self) -> Result<()> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        self.file.set_len(0)?;
        self.file.sync_all()?;
        self.cache.clear();
        self.disk_size = 0;
        self.size = 0;
        tracing::debug!(path = %self.path.display(), "truncated block file");
        Ok(())
    }

    /// Close the file, discarding uncommitted changes
    pub fn close(self) -> Result<()> {
        let dirty = self.cache.dirty_count();
        if dirty > 0 {
            tracing::warn!(
                path = %self.path.display(),
                blocks = dirty,
                "closing with uncommitted blocks, changes are discarded"
            );
        }
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Logical size in bytes, including uncommitted blocks
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Size of the committed content in bytes
    pub fn disk_size(&self) -> u64 {
        self.disk_size
    }

    /// Number of blocks in the logical file
    pub fn block_count(&self) -> u64 {
        self.size / BLOCK
    }

    /// Number of blocks currently loaded
    pub fn cached_blocks(&self) -> usize {
        self.cache.len()
    }

    /// Number of loaded blocks with uncommitted changes
    pub fn dirty_blocks(&self) -> usize {
        self.cache.dirty_count()
    }

    /// Whether a block is currently loaded
    pub fn is_cached(&self, index: u64) -> bool {
        self.cache.contains(index)
    }

    pub(crate) fn pool(&self) -> &ProxyPool {
        &self.pool
    }
}

/// Offset of `location` within its block, if `width` bytes fit in that block
fn check_within_block(location: u64, width: usize) -> Result<usize> {
    let within = (location % BLOCK) as usize;
    if within + width > BLOCK_SIZE {
        return Err(StoreError::StraddlesBlock { location, width });
    }
    Ok(within)
}

fn round_up(size: u64) -> u64 {
    size.div_ceil(BLOCK) * BLOCK
}
