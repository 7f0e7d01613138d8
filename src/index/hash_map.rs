//! Disk Hash Map
//!
//! Open hashing with chained buckets, stored in blocks of a [`BlockFile`].
//!
//! ## Map Header (32 bytes)
//! ```text
//! ┌────────────┬───────────┬───────────┬────────────┐
//! │ Count (4)  │ Size (4)  │ Threshold │ LoadFactor │
//! ├────────────┴───────────┼───────────┴────────────┤
//! │ Table Header Loc (8)   │ Next Record Loc (8)    │
//! └────────────────────────┴────────────────────────┘
//! ```
//!
//! ## Record
//! ```text
//! ┌──────────┬─────────┬───────────┬──────────┬─────┬───────┐
//! │ Next (8) │ KLen (4)│ VLen (4)  │ Hash (4) │ Key │ Value │
//! └──────────┴─────────┴───────────┴──────────┴─────┴───────┘
//! ```
//!
//! Keys and values are bincode-encoded; the hash is the CRC32 of the key
//! bytes. Location 0 means "none" (block 0 never holds map data). Records
//! never cross a block boundary. There is no removal and no rehashing: the
//! threshold is kept up to date but never acted upon.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, StoreError};
use crate::storage::{BlockFile, BlockHooks, BLOCK_SIZE};

/// Size of the map header
pub const MAP_HEADER_SIZE: usize = 4 + 4 + 4 + 4 + 8 + 8;

/// Size of the fixed part of a record
pub const RECORD_HEADER_SIZE: usize = 8 + 4 + 4 + 4;

/// Number of 8-byte locations in one block
const SLOTS_PER_BLOCK: u32 = (BLOCK_SIZE / 8) as u32;

/// Largest number of buckets
pub const MAX_TABLE_SIZE: u32 = SLOTS_PER_BLOCK * SLOTS_PER_BLOCK;

const OFFSET_COUNT: u64 = 0;
const OFFSET_TABLE_SIZE: u64 = 4;
const OFFSET_THRESHOLD: u64 = 8;
const OFFSET_LOAD_FACTOR: u64 = 12;
const OFFSET_TABLE_HEADER: u64 = 16;
const OFFSET_NEXT_RECORD: u64 = 24;

const NONE: u64 = 0;

/// Fixed part of a stored record
struct RecordHeader {
    next: u64,
    key_length: u32,
    value_length: u32,
    hash: u32,
}

impl RecordHeader {
    fn read<H: BlockHooks>(file: &mut BlockFile<H>, location: u64) -> Result<Self> {
        Ok(Self {
            next: file.read_u64(location)?,
            key_length: file.read_u32(location + 8)?,
            value_length: file.read_u32(location + 12)?,
            hash: file.read_u32(location + 16)?,
        })
    }
}

/// Read the bytes following a record header
fn read_span<H: BlockHooks>(file: &mut BlockFile<H>, location: u64, length: u32) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; length as usize];
    file.read_bytes(location, &mut buffer)?;
    Ok(buffer)
}

/// Whether the record at `location` holds exactly `key`
fn key_matches<H: BlockHooks>(
    file: &mut BlockFile<H>,
    location: u64,
    record: &RecordHeader,
    key: &[u8],
    hash: u32,
) -> Result<bool> {
    if record.hash != hash || record.key_length as usize != key.len() {
        return Ok(false);
    }
    let stored = read_span(file, location + RECORD_HEADER_SIZE as u64, record.key_length)?;
    Ok(stored == key)
}

/// Location and header of the first record for `key`, walking from `location`
fn find_from<H: BlockHooks>(
    file: &mut BlockFile<H>,
    mut location: u64,
    key: &[u8],
    hash: u32,
) -> Result<Option<(u64, RecordHeader)>> {
    while location != NONE {
        let record = RecordHeader::read(file, location)?;
        if key_matches(file, location, &record, key, hash)? {
            return Ok(Some((location, record)));
        }
        location = record.next;
    }
    Ok(None)
}

/// Hash map of `K` to `V` stored in a block file
///
/// The map does not own the file: every operation borrows it, so several
/// maps can share one file.
#[derive(Debug)]
pub struct DiskHashMap<K, V> {
    /// Location of the map header
    header: u64,
    entry_count: u32,
    table_size: u32,
    threshold: u32,
    load_factor: f32,
    /// Location of the table header block, or 0
    table_header: u64,
    /// Where the next record may go, or 0
    next_record: u64,
    _types: PhantomData<fn(K) -> V>,
}

impl<K, V> DiskHashMap<K, V>
where
    K: Serialize,
    V: Serialize + DeserializeOwned,
{
    /// Create an empty map in a fresh block of `file`
    ///
    /// `table_size` is rounded up to a power of two and capped at
    /// [`MAX_TABLE_SIZE`].
    pub fn create<H: BlockHooks>(
        file: &mut BlockFile<H>,
        table_size: u32,
        load_factor: f32,
    ) -> Result<Self> {
        let table_size = table_size
            .max(1)
            .checked_next_power_of_two()
            .map_or(MAX_TABLE_SIZE, |size| size.min(MAX_TABLE_SIZE));
        if file.size() == 0 {
            // location 0 stands for "none", keep block 0 out of the map
            file.allocate_block()?;
        }
        let header = file.allocate_block()? * BLOCK_SIZE as u64;
        let map = Self {
            header,
            entry_count: 0,
            table_size,
            threshold: (table_size as f32 * load_factor) as u32,
            load_factor,
            table_header: NONE,
            next_record: NONE,
            _types: PhantomData,
        };
        file.write_u32(header + OFFSET_COUNT, map.entry_count)?;
        file.write_u32(header + OFFSET_TABLE_SIZE, map.table_size)?;
        file.write_u32(header + OFFSET_THRESHOLD, map.threshold)?;
        file.write_f32(header + OFFSET_LOAD_FACTOR, map.load_factor)?;
        file.write_u64(header + OFFSET_TABLE_HEADER, map.table_header)?;
        file.write_u64(header + OFFSET_NEXT_RECORD, map.next_record)?;
        tracing::debug!(location = header, table_size, "created disk hash map");
        Ok(map)
    }

    /// Load a map whose header is at `location`
    pub fn open<H: BlockHooks>(file: &mut BlockFile<H>, location: u64) -> Result<Self> {
        let table_size = file.read_u32(location + OFFSET_TABLE_SIZE)?;
        if !table_size.is_power_of_two() || table_size > MAX_TABLE_SIZE {
            return Err(StoreError::Corrupted(format!(
                "hash map at {} has an invalid table size {}",
                location, table_size
            )));
        }
        Ok(Self {
            header: location,
            entry_count: file.read_u32(location + OFFSET_COUNT)?,
            table_size,
            threshold: file.read_u32(location + OFFSET_THRESHOLD)?,
            load_factor: file.read_f32(location + OFFSET_LOAD_FACTOR)?,
            table_header: file.read_u64(location + OFFSET_TABLE_HEADER)?,
            next_record: file.read_u64(location + OFFSET_NEXT_RECORD)?,
            _types: PhantomData,
        })
    }

    /// Location of the map header, to find the map again with [`open`](Self::open)
    pub fn location(&self) -> u64 {
        self.header
    }

    /// Number of records
    pub fn len(&self) -> u32 {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    pub fn table_size(&self) -> u32 {
        self.table_size
    }

    /// Record count past which a resize would be due
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn load_factor(&self) -> f32 {
        self.load_factor
    }

    // =========================================================================
    // Buckets
    // =========================================================================

    fn split(&self, hash: u32) -> (u64, u64) {
        let index = hash & (self.table_size - 1);
        ((index / SLOTS_PER_BLOCK) as u64, (index % SLOTS_PER_BLOCK) as u64)
    }

    /// Location of the bucket slot for `hash`, if it was ever materialized
    fn find_bucket<H: BlockHooks>(&self, file: &mut BlockFile<H>, hash: u32) -> Result<Option<u64>> {
        if self.table_header == NONE {
            return Ok(None);
        }
        let (upper, lower) = self.split(hash);
        let table = file.read_u64(self.table_header + upper * 8)?;
        if table == NONE {
            return Ok(None);
        }
        Ok(Some(table + lower * 8))
    }

    /// Location of the bucket slot for `hash`, creating the blocks on the way
    fn resolve_bucket<H: BlockHooks>(&mut self, file: &mut BlockFile<H>, hash: u32) -> Result<u64> {
        if self.table_header == NONE {
            self.table_header = file.allocate_block()? * BLOCK_SIZE as u64;
            file.write_u64(self.header + OFFSET_TABLE_HEADER, self.table_header)?;
        }
        let (upper, lower) = self.split(hash);
        let mut table = file.read_u64(self.table_header + upper * 8)?;
        if table == NONE {
            table = file.allocate_block()? * BLOCK_SIZE as u64;
            file.write_u64(self.table_header + upper * 8, table)?;
        }
        Ok(table + lower * 8)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Add a (key, value) record
    ///
    /// Returns false when the exact same record already exists. A key may
    /// hold several different values.
    pub fn put<H: BlockHooks>(&mut self, file: &mut BlockFile<H>, key: &K, value: &V) -> Result<bool> {
        let key_bytes = bincode::serialize(key)?;
        let value_bytes = bincode::serialize(value)?;
        let hash = crc32fast::hash(&key_bytes);

        // walk to the tail of the bucket chain
        let mut link = self.resolve_bucket(file, hash)?;
        let mut target = file.read_u64(link)?;
        while target != NONE {
            let record = RecordHeader::read(file, target)?;
            if key_matches(file, target, &record, &key_bytes, hash)?
                && record.value_length as usize == value_bytes.len()
            {
                let at = target + RECORD_HEADER_SIZE as u64 + record.key_length as u64;
                if read_span(file, at, record.value_length)? == value_bytes {
                    return Ok(false);
                }
            }
            link = target;
            target = record.next;
        }

        let total = RECORD_HEADER_SIZE + key_bytes.len() + value_bytes.len();
        if total > BLOCK_SIZE {
            return Err(StoreError::EntryTooLarge {
                size: total,
                max: BLOCK_SIZE,
            });
        }
        let location = self.place(file, total)?;
        file.write_u64(location, NONE)?;
        file.write_u32(location + 8, key_bytes.len() as u32)?;
        file.write_u32(location + 12, value_bytes.len() as u32)?;
        file.write_u32(location + 16, hash)?;
        file.write_bytes(location + RECORD_HEADER_SIZE as u64, &key_bytes)?;
        file.write_bytes(location + (RECORD_HEADER_SIZE + key_bytes.len()) as u64, &value_bytes)?;
        file.write_u64(link, location)?;

        self.next_record = location + total as u64;
        self.entry_count += 1;
        file.write_u64(self.header + OFFSET_NEXT_RECORD, self.next_record)?;
        file.write_u32(self.header + OFFSET_COUNT, self.entry_count)?;
        if self.entry_count > self.threshold {
            tracing::debug!(
                entries = self.entry_count,
                threshold = self.threshold,
                "disk hash map is over its load threshold"
            );
        }
        Ok(true)
    }

    /// Location for a new record of `total` bytes
    fn place<H: BlockHooks>(&self, file: &mut BlockFile<H>, total: usize) -> Result<u64> {
        let within = (self.next_record % BLOCK_SIZE as u64) as usize;
        // at a block boundary the following block may belong to something else
        if self.next_record != NONE && within != 0 && BLOCK_SIZE - within >= total {
            return Ok(self.next_record);
        }
        Ok(file.allocate_block()? * BLOCK_SIZE as u64)
    }

    /// Add a record only when `key` has no value yet
    ///
    /// Returns whether the record was added.
    pub fn try_put<H: BlockHooks>(&mut self, file: &mut BlockFile<H>, key: &K, value: &V) -> Result<bool> {
        if self.contains_key(file, key)? {
            return Ok(false);
        }
        self.put(file, key, value)
    }

    /// First value stored for `key`
    pub fn get<H: BlockHooks>(&self, file: &mut BlockFile<H>, key: &K) -> Result<Option<V>> {
        self.get_all(file, key)?.next().transpose()
    }

    pub fn contains_key<H: BlockHooks>(&self, file: &mut BlockFile<H>, key: &K) -> Result<bool> {
        let key_bytes = bincode::serialize(key)?;
        let hash = crc32fast::hash(&key_bytes);
        let Some(bucket) = self.find_bucket(file, hash)? else {
            return Ok(false);
        };
        let head = file.read_u64(bucket)?;
        Ok(find_from(file, head, &key_bytes, hash)?.is_some())
    }

    /// Every value stored for `key`, in insertion order
    pub fn get_all<'f, H: BlockHooks>(
        &self,
        file: &'f mut BlockFile<H>,
        key: &K,
    ) -> Result<Entries<'f, H, V>> {
        let key_bytes = bincode::serialize(key)?;
        let hash = crc32fast::hash(&key_bytes);
        let next = match self.find_bucket(file, hash)? {
            Some(bucket) => file.read_u64(bucket)?,
            None => NONE,
        };
        Ok(Entries {
            file,
            key: key_bytes,
            hash,
            next,
            _value: PhantomData,
        })
    }
}

/// Iterator over the values of one key
pub struct Entries<'f, H, V> {
    file: &'f mut BlockFile<H>,
    key: Vec<u8>,
    hash: u32,
    /// Next record to examine, or 0
    next: u64,
    _value: PhantomData<fn() -> V>,
}

impl<'f, H: BlockHooks, V: DeserializeOwned> Entries<'f, H, V> {
    fn advance(&mut self) -> Result<Option<V>> {
        let found = find_from(self.file, self.next, &self.key, self.hash)?;
        let Some((location, record)) = found else {
            self.next = NONE;
            return Ok(None);
        };
        self.next = record.next;
        let at = location + RECORD_HEADER_SIZE as u64 + record.key_length as u64;
        let bytes = read_span(self.file, at, record.value_length)?;
        Ok(Some(bincode::deserialize(&bytes)?))
    }
}

impl<'f, H: BlockHooks, V: DeserializeOwned> Iterator for Entries<'f, H, V> {
    type Item = Result<V>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == NONE {
            return None;
        }
        match self.advance() {
            Ok(Some(value)) => Some(Ok(value)),
            Ok(None) => None,
            Err(error) => {
                self.next = NONE;
                Some(Err(error))
            }
        }
    }
}
