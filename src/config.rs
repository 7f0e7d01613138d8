//! Configuration for pagestore
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{Result, StoreError};
use crate::storage::{BLOCK_SIZE, MAX_BLOCKS_PER_FILE};

/// Main configuration for a pagestore instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── {store_name}_data000   (first data file)
    ///     ├── {store_name}_data001   (rollover files, if any)
    ///     └── {store_name}_index     (hash buckets + blank counter)
    pub data_dir: PathBuf,

    /// Prefix for every file of the store
    pub store_name: String,

    /// Open every file read-only; mutating calls fail
    pub read_only: bool,

    /// Upper bound on blocks per physical file before rolling over
    pub max_blocks_per_file: u32,

    /// Let pages reuse tombstoned slots for new entries
    pub reuse_empty_entries: bool,

    // -------------------------------------------------------------------------
    // Cache Configuration
    // -------------------------------------------------------------------------
    /// Number of blocks kept in memory per file
    pub block_cache_capacity: usize,

    /// Number of pooled I/O proxies per file
    pub proxy_pool_capacity: usize,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// Bucket count of a new hash map (power of two)
    pub hash_table_size: u32,

    /// Load factor used to compute the (tracked) resize threshold
    pub hash_load_factor: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./pagestore_data"),
            store_name: "nodes".to_string(),
            read_only: false,
            max_blocks_per_file: MAX_BLOCKS_PER_FILE,
            reuse_empty_entries: true,
            block_cache_capacity: 256,
            proxy_pool_capacity: 16,
            hash_table_size: 1024,
            hash_load_factor: 0.75,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check that the values can describe a working store
    pub fn validate(&self) -> Result<()> {
        if self.store_name.is_empty() {
            return Err(StoreError::Config("store name must not be empty".to_string()));
        }
        // block 0 is the header, at least one data block is needed
        if self.max_blocks_per_file < 2 || self.max_blocks_per_file > MAX_BLOCKS_PER_FILE {
            return Err(StoreError::Config(format!(
                "max_blocks_per_file must be within 2..={}, got {}",
                MAX_BLOCKS_PER_FILE, self.max_blocks_per_file
            )));
        }
        if self.block_cache_capacity == 0 {
            return Err(StoreError::Config("block cache capacity must be positive".to_string()));
        }
        if self.proxy_pool_capacity == 0 {
            return Err(StoreError::Config("proxy pool capacity must be positive".to_string()));
        }
        let max_table = (BLOCK_SIZE as u32 / 8) * (BLOCK_SIZE as u32 / 8);
        if !self.hash_table_size.is_power_of_two() || self.hash_table_size > max_table {
            return Err(StoreError::Config(format!(
                "hash table size must be a power of two no larger than {}, got {}",
                max_table, self.hash_table_size
            )));
        }
        if !(self.hash_load_factor > 0.0 && self.hash_load_factor <= 1.0) {
            return Err(StoreError::Config(format!(
                "hash load factor must be within (0, 1], got {}",
                self.hash_load_factor
            )));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the prefix used for the store's files
    pub fn store_name(mut self, name: impl Into<String>) -> Self {
        self.config.store_name = name.into();
        self
    }

    /// Open the store read-only
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.config.read_only = read_only;
        self
    }

    /// Set the number of blocks a file may hold before rolling over
    pub fn max_blocks_per_file(mut self, count: u32) -> Self {
        self.config.max_blocks_per_file = count;
        self
    }

    /// Enable or disable the reuse of tombstoned page slots
    pub fn reuse_empty_entries(mut self, reuse: bool) -> Self {
        self.config.reuse_empty_entries = reuse;
        self
    }

    /// Set the per-file block cache capacity
    pub fn block_cache_capacity(mut self, blocks: usize) -> Self {
        self.config.block_cache_capacity = blocks;
        self
    }

    /// Set the per-file proxy pool capacity
    pub fn proxy_pool_capacity(mut self, count: usize) -> Self {
        self.config.proxy_pool_capacity = count;
        self
    }

    /// Set the bucket count for new hash maps
    pub fn hash_table_size(mut self, size: u32) -> Self {
        self.config.hash_table_size = size;
        self
    }

    /// Set the load factor for new hash maps
    pub fn hash_load_factor(mut self, factor: f32) -> Self {
        self.config.hash_load_factor = factor;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
