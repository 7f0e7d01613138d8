//! File Store
//!
//! Entry storage spread over numbered physical files.
//!
//! ## Responsibilities
//! - Discover existing files on startup (`{name}000`, `{name}001`, ...)
//! - Hand out 64-bit keys: file radical in the high 32 bits
//! - Roll over to a new file when the last one is full
//! - Commit/rollback every file together

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::io::IoProxy;

use super::key::EntryKey;
use super::page::{PageHooks, MAX_ENTRY_SIZE};
use super::store_file::{FileStats, PageFailure, StoreFile};

/// Storage of variable-length entries behind stable keys
///
/// ## Concurrency:
/// Not thread-safe; every method takes `&mut self`. Wrap in a lock to
/// share (see [`NodeStore`](crate::nodes::NodeStore)).
pub struct FileStore {
    /// Directory holding the files
    directory: PathBuf,
    /// Common prefix of the file names
    name: String,
    config: Config,
    /// Open files, indexed by radical
    files: Vec<StoreFile>,
}

impl FileStore {
    /// Open or create a store in `directory`
    ///
    /// On startup:
    /// 1. Create the directory if missing (unless read-only)
    /// 2. Open `{name}000`, `{name}001`, ... until a file is missing
    /// 3. Create `{name}000` if no file exists (unless read-only)
    pub fn open(directory: &Path, name: &str, config: &Config) -> Result<Self> {
        config.validate()?;
        if !config.read_only {
            fs::create_dir_all(directory)?;
        }

        let mut store = Self {
            directory: directory.to_path_buf(),
            name: name.to_string(),
            config: config.clone(),
            files: Vec::new(),
        };

        loop {
            let path = store.file_path(store.files.len());
            if !path.is_file() {
                break;
            }
            let file = StoreFile::open(&path, store.files.len() as u32, config)?;
            store.files.push(file);
        }

        if store.files.is_empty() {
            if config.read_only {
                return Err(StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no store file {} found", store.file_path(0).display()),
                )));
            }
            let file = StoreFile::open(&store.file_path(0), 0, config)?;
            store.files.push(file);
        }

        tracing::debug!(
            directory = %store.directory.display(),
            name = %store.name,
            files = store.files.len(),
            "opened file store"
        );
        Ok(store)
    }

    fn file_path(&self, index: usize) -> PathBuf {
        self.directory.join(format!("{}{:03}", self.name, index))
    }

    fn file_for(&mut self, key: EntryKey) -> Result<&mut StoreFile> {
        self.files
            .get_mut(key.radical() as usize)
            .ok_or(StoreError::InvalidKey(key.raw()))
    }

    pub fn is_read_only(&self) -> bool {
        self.config.read_only
    }

    /// Whether the store holds a single file without any data block
    pub fn is_empty(&mut self) -> Result<bool> {
        match self.files.as_mut_slice() {
            [only] => only.is_empty(),
            _ => Ok(false),
        }
    }

    /// Number of physical files
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    // =========================================================================
    // Entries
    // =========================================================================

    /// Reserve an entry of `entry_size` bytes and return its key
    ///
    /// The content is written afterwards through [`access`](Self::access).
    pub fn add(&mut self, entry_size: usize) -> Result<EntryKey> {
        if self.config.read_only {
            return Err(StoreError::ReadOnly);
        }
        if entry_size > MAX_ENTRY_SIZE {
            return Err(StoreError::EntryTooLarge {
                size: entry_size,
                max: MAX_ENTRY_SIZE,
            });
        }

        if let Some(last) = self.files.last_mut() {
            if let Some(short_key) = last.allocate(entry_size)? {
                return EntryKey::from_parts(last.radical(), short_key);
            }
        }

        // keys must stay positive as signed 64-bit values
        let radical = u32::try_from(self.files.len())
            .ok()
            .filter(|&radical| radical <= i32::MAX as u32)
            .ok_or_else(|| StoreError::Corrupted("file index space exhausted".to_string()))?;
        let path = self.file_path(self.files.len());
        tracing::info!(path = %path.display(), radical, "rolling over to a new store file");
        let mut file = StoreFile::open(&path, radical, &self.config)?;
        let short_key = file
            .allocate(entry_size)?
            .ok_or(StoreError::PageFull(entry_size))?;
        self.files.push(file);
        EntryKey::from_parts(radical, short_key)
    }

    /// Writable proxy over the entry of `key`
    pub fn access(&mut self, key: EntryKey) -> Result<IoProxy<'_, PageHooks>> {
        if self.config.read_only {
            return Err(StoreError::ReadOnly);
        }
        self.file_for(key)?.access(key.short_key(), true)
    }

    /// Read-only proxy over the entry of `key`
    pub fn read(&mut self, key: EntryKey) -> Result<IoProxy<'_, PageHooks>> {
        self.file_for(key)?.access(key.short_key(), false)
    }

    /// Free the entry of `key`, returning the length of its slot
    pub fn remove(&mut self, key: EntryKey) -> Result<usize> {
        if self.config.read_only {
            return Err(StoreError::ReadOnly);
        }
        self.file_for(key)?.remove(key.short_key())
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Flush every dirty block of every file, returning the block count
    pub fn commit(&mut self) -> Result<usize> {
        let mut written = 0;
        for file in &mut self.files {
            written += file.commit()?;
        }
        tracing::debug!(name = %self.name, blocks = written, "committed file store");
        Ok(written)
    }

    /// Discard every uncommitted change, returning the block count
    ///
    /// Trailing files that never reached the disk are deleted, so a rollover
    /// made inside the transaction is undone. `{name}000` always stays.
    pub fn rollback(&mut self) -> Result<usize> {
        let mut discarded = 0;
        for file in &mut self.files {
            discarded += file.rollback()?;
        }

        if !self.config.read_only {
            while self.files.len() > 1 && self.files.last().is_some_and(|f| f.disk_size() == 0) {
                let Some(file) = self.files.pop() else { break };
                let path = file.path().to_path_buf();
                file.close()?;
                fs::remove_file(&path)?;
                tracing::info!(path = %path.display(), "removed uncommitted store file");
            }
        }

        tracing::debug!(name = %self.name, blocks = discarded, "rolled back file store");
        Ok(discarded)
    }

    /// Delete every file and start over with an empty `{name}000`
    pub fn clear(&mut self) -> Result<()> {
        if self.config.read_only {
            return Err(StoreError::ReadOnly);
        }
        for file in self.files.drain(..) {
            let path = file.path().to_path_buf();
            file.close()?;
            fs::remove_file(&path)?;
        }
        let file = StoreFile::open(&self.file_path(0), 0, &self.config)?;
        self.files.push(file);
        tracing::info!(name = %self.name, "cleared file store");
        Ok(())
    }

    /// Release every file
    ///
    /// Uncommitted changes are discarded, commit first to keep them.
    pub fn close(self) -> Result<()> {
        for file in self.files {
            file.close()?;
        }
        Ok(())
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    pub fn stats(&mut self) -> Result<Vec<FileStats>> {
        self.files.iter_mut().map(StoreFile::stats).collect()
    }

    /// Load every page of every file, collecting verification failures
    pub fn verify(&mut self) -> Result<Vec<PageFailure>> {
        let mut failures = Vec::new();
        for file in &mut self.files {
            failures.extend(file.verify()?);
        }
        Ok(failures)
    }
}
