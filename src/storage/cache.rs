//! Block Cache
//!
//! Fixed-capacity cache of loaded blocks for one file.
//!
//! ## Structure
//! - `slots`: the cached blocks (buffer, dirty flag, last access tick)
//! - `lookup`: block index → slot, O(1) hit detection
//! - `recency`: access tick → slot, ordered oldest first
//!
//! Eviction takes the clean slot with the oldest tick. Dirty slots are
//! never evicted; when every slot is dirty the cache grows past its
//! capacity until the next commit or rollback.

use std::collections::{BTreeMap, HashMap};

use bytes::BytesMut;

use super::BLOCK_SIZE;

/// A block held in memory
#[derive(Debug)]
pub struct CachedBlock {
    /// Index of the block in its file
    pub index: u64,
    /// Block content (always BLOCK_SIZE bytes)
    pub data: BytesMut,
    /// Modified since the last commit/rollback
    pub dirty: bool,
    /// Last access tick
    tick: u64,
}

/// Cache of loaded blocks with oldest-clean-first eviction
#[derive(Debug)]
pub struct BlockCache {
    capacity: usize,
    slots: Vec<CachedBlock>,
    lookup: HashMap<u64, usize>,
    recency: BTreeMap<u64, usize>,
    tick: u64,
}

impl BlockCache {
    /// Create an empty cache holding up to `capacity` clean blocks
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: Vec::with_capacity(capacity),
            lookup: HashMap::with_capacity(capacity),
            recency: BTreeMap::new(),
            tick: 0,
        }
    }

    /// Find the slot for a block and mark it as most recently used
    pub fn touch(&mut self, index: u64) -> Option<usize> {
        let slot = *self.lookup.get(&index)?;
        self.tick += 1;
        let old_tick = self.slots[slot].tick;
        self.recency.remove(&old_tick);
        self.recency.insert(self.tick, slot);
        self.slots[slot].tick = self.tick;
        Some(slot)
    }

    /// Whether a block is cached (does not count as an access)
    pub fn contains(&self, index: u64) -> bool {
        self.lookup.contains_key(&index)
    }

    pub fn slot(&self, slot: usize) -> &CachedBlock {
        &self.slots[slot]
    }

    pub fn slot_mut(&mut self, slot: usize) -> &mut CachedBlock {
        &mut self.slots[slot]
    }

    /// Insert a freshly loaded block, evicting the oldest clean block when full
    ///
    /// Returns the slot now holding the block.
    pub fn insert(&mut self, index: u64, data: BytesMut) -> usize {
        debug_assert_eq!(data.len(), BLOCK_SIZE);
        self.tick += 1;
        let block = CachedBlock {
            index,
            data,
            dirty: false,
            tick: self.tick,
        };

        let slot = if self.slots.len() < self.capacity {
            self.slots.push(block);
            self.slots.len() - 1
        } else if let Some(victim) = self.oldest_clean() {
            let evicted = std::mem::replace(&mut self.slots[victim], block);
            tracing::trace!(block = evicted.index, "evicting clean block");
            self.lookup.remove(&evicted.index);
            self.recency.remove(&evicted.tick);
            victim
        } else {
            if self.slots.len() == self.capacity {
                tracing::warn!(
                    capacity = self.capacity,
                    "every cached block is dirty, growing the cache past its capacity"
                );
            }
            self.slots.push(block);
            self.slots.len() - 1
        };

        self.lookup.insert(index, slot);
        self.recency.insert(self.tick, slot);
        slot
    }

    /// Drop a block from the cache, returning it
    pub fn remove(&mut self, index: u64) -> Option<CachedBlock> {
        let slot = self.lookup.remove(&index)?;
        let removed = self.slots.swap_remove(slot);
        self.recency.remove(&removed.tick);
        // the last slot moved into the hole
        if slot < self.slots.len() {
            let moved = &self.slots[slot];
            self.lookup.insert(moved.index, slot);
            self.recency.insert(moved.tick, slot);
        }
        Some(removed)
    }

    /// Slots of every dirty block, ordered by block index
    pub fn dirty_slots(&self) -> Vec<usize> {
        let mut dirty: Vec<usize> = (0..self.slots.len())
            .filter(|&slot| self.slots[slot].dirty)
            .collect();
        dirty.sort_by_key(|&slot| self.slots[slot].index);
        dirty
    }

    /// Number of dirty blocks
    pub fn dirty_count(&self) -> usize {
        self.slots.iter().filter(|block| block.dirty).count()
    }

    /// Number of cached blocks
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Forget every cached block, dirty or not
    pub fn clear(&mut self) {
        self.slots.clear();
        self.lookup.clear();
        self.recency.clear();
    }

    fn oldest_clean(&self) -> Option<usize> {
        self.recency
            .values()
            .copied()
            .find(|&slot| !self.slots[slot].dirty)
    }
}
