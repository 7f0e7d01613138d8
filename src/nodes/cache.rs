//! Node Cache
//!
//! Weak map from entry key to live node handle. A handle stays cached as
//! long as someone holds it; dead slots are swept when the map grows.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Map size below which no sweep happens
const MIN_SWEEP_SIZE: usize = 64;

#[derive(Debug)]
pub(crate) struct NodeCache<T> {
    nodes: HashMap<u64, Weak<T>>,
    /// Size at which the next insertion sweeps dead slots
    sweep_at: usize,
}

impl<T> NodeCache<T> {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            sweep_at: MIN_SWEEP_SIZE,
        }
    }

    /// Live handle cached for `key`
    pub fn get(&self, key: u64) -> Option<Arc<T>> {
        self.nodes.get(&key).and_then(Weak::upgrade)
    }

    pub fn insert(&mut self, key: u64, node: &Arc<T>) {
        if self.nodes.len() >= self.sweep_at {
            self.nodes.retain(|_, node| node.strong_count() > 0);
            self.sweep_at = (self.nodes.len() * 2).max(MIN_SWEEP_SIZE);
            tracing::trace!(live = self.nodes.len(), "swept node cache");
        }
        self.nodes.insert(key, Arc::downgrade(node));
    }

    /// Number of live handles
    pub fn live(&self) -> usize {
        self.nodes.values().filter(|node| node.strong_count() > 0).count()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.sweep_at = MIN_SWEEP_SIZE;
    }
}
