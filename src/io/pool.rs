//! Proxy Pool
//!
//! Fixed set of proxy slots shared by the proxies of one file.
//!
//! A proxy borrows its file mutably, so the borrow checker already keeps
//! proxies scoped and at most one is live per file at a time. The pool
//! bounds how many proxies may be outstanding; slots carry only an id.

use crossbeam::queue::ArrayQueue;

use crate::error::{Result, StoreError};

/// Number of proxies available per file by default
pub const DEFAULT_POOL_CAPACITY: usize = 16;

/// Token proving ownership of one pooled proxy
#[derive(Debug, PartialEq, Eq)]
pub struct ProxySlot {
    id: usize,
}

impl ProxySlot {
    pub fn id(&self) -> usize {
        self.id
    }
}

/// Bounded pool of proxy slots
#[derive(Debug)]
pub struct ProxyPool {
    slots: ArrayQueue<ProxySlot>,
}

impl ProxyPool {
    /// Create a pool with every slot available
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let slots = ArrayQueue::new(capacity);
        for id in 0..capacity {
            let pushed = slots.push(ProxySlot { id }).is_ok();
            debug_assert!(pushed, "queue holds exactly `capacity` slots");
        }
        Self { slots }
    }

    /// Take a slot, failing when every slot is in use
    pub fn acquire(&self) -> Result<ProxySlot> {
        self.slots
            .pop()
            .ok_or(StoreError::PoolExhausted(self.slots.capacity()))
    }

    /// Give a slot back
    pub fn release(&self, slot: ProxySlot) {
        if let Err(slot) = self.slots.push(slot) {
            tracing::warn!(slot = slot.id, "proxy slot released to a full pool");
        }
    }

    /// Number of slots currently available
    pub fn available(&self) -> usize {
        self.slots.len()
    }

    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }
}
