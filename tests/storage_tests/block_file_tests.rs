//! Tests for BlockFile
//!
//! These tests verify:
//! - Block allocation and sizing
//! - Typed big-endian access and the no-straddle rule
//! - Commit (persistence, hook order) and rollback
//! - Cache eviction never dropping dirty blocks
//! - Read-only files

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use pagestore::storage::{BlockFile, BlockHooks, NoHooks, BLOCK_SIZE};
use pagestore::{Result, StoreError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_file() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.blocks");
    (temp_dir, path)
}

fn open(path: &Path) -> BlockFile<NoHooks> {
    BlockFile::open(path, false, 16, 16, NoHooks).unwrap()
}

/// Records the order of commit hook calls
#[derive(Clone, Default)]
struct RecordingHooks {
    committed: Arc<Mutex<Vec<u64>>>,
}

impl BlockHooks for RecordingHooks {
    fn on_load(&self, _index: u64, _data: &[u8]) -> Result<()> {
        Ok(())
    }

    fn on_commit(&self, index: u64, data: &mut [u8]) {
        self.committed.lock().unwrap().push(index);
        data[0] = 0x7F;
    }
}

/// Refuses to load one block
struct RejectingHooks {
    rejected: u64,
}

impl BlockHooks for RejectingHooks {
    fn on_load(&self, index: u64, _data: &[u8]) -> Result<()> {
        if index == self.rejected {
            return Err(StoreError::ChecksumMismatch { block: index });
        }
        Ok(())
    }

    fn on_commit(&self, _index: u64, _data: &mut [u8]) {}
}

// =============================================================================
// Allocation Tests
// =============================================================================

#[test]
fn test_new_file_is_empty() {
    let (_temp, path) = setup_temp_file();
    let file = open(&path);

    assert_eq!(file.size(), 0);
    assert_eq!(file.disk_size(), 0);
    assert_eq!(file.block_count(), 0);
    assert!(!file.is_read_only());
}

#[test]
fn test_allocate_blocks_in_sequence() {
    let (_temp, path) = setup_temp_file();
    let mut file = open(&path);

    assert_eq!(file.allocate_block().unwrap(), 0);
    assert_eq!(file.allocate_block().unwrap(), 1);
    assert_eq!(file.allocate_block().unwrap(), 2);
    assert_eq!(file.size(), 3 * BLOCK_SIZE as u64);
    // nothing reached the disk yet
    assert_eq!(file.disk_size(), 0);
    assert!(file.block(2).unwrap().iter().all(|&b| b == 0));
}

#[test]
fn test_block_past_end_fails() {
    let (_temp, path) = setup_temp_file();
    let mut file = open(&path);
    file.allocate_block().unwrap();

    assert!(matches!(file.block(1), Err(StoreError::OutOfBounds { .. })));
}

// =============================================================================
// Typed Access Tests
// =============================================================================

#[test]
fn test_values_are_big_endian() {
    let (_temp, path) = setup_temp_file();
    let mut file = open(&path);
    file.allocate_block().unwrap();

    file.write_u32(0, 0x0102_0304).unwrap();
    file.write_u16(4, 0x0506).unwrap();

    assert_eq!(&file.block(0).unwrap()[..6], &[1, 2, 3, 4, 5, 6]);
}

#[test]
fn test_typed_round_trip() {
    let (_temp, path) = setup_temp_file();
    let mut file = open(&path);
    file.allocate_block().unwrap();

    file.write_u8(0, 200).unwrap();
    file.write_u16(1, 0xFFFE).unwrap();
    file.write_i32(3, -123_456).unwrap();
    file.write_u32(7, 4_000_000_000).unwrap();
    file.write_i64(11, -1).unwrap();
    file.write_u64(19, u64::MAX - 1).unwrap();
    file.write_f32(27, 3.5).unwrap();
    file.write_f64(31, std::f64::consts::PI).unwrap();

    assert_eq!(file.read_u8(0).unwrap(), 200);
    assert_eq!(file.read_u16(1).unwrap(), 0xFFFE);
    assert_eq!(file.read_i32(3).unwrap(), -123_456);
    assert_eq!(file.read_u32(7).unwrap(), 4_000_000_000);
    assert_eq!(file.read_i64(11).unwrap(), -1);
    assert_eq!(file.read_u64(19).unwrap(), u64::MAX - 1);
    assert_eq!(file.read_f32(27).unwrap(), 3.5);
    assert_eq!(file.read_f64(31).unwrap(), std::f64::consts::PI);
}

#[test]
fn test_primitive_straddling_blocks_fails() {
    let (_temp, path) = setup_temp_file();
    let mut file = open(&path);
    file.allocate_block().unwrap();
    file.allocate_block().unwrap();

    let location = BLOCK_SIZE as u64 - 2;
    assert!(matches!(
        file.write_u32(location, 1),
        Err(StoreError::StraddlesBlock { width: 4, .. })
    ));
    assert!(matches!(
        file.read_i64(location),
        Err(StoreError::StraddlesBlock { width: 8, .. })
    ));
    // exactly at the end of the block is fine
    file.write_u16(location, 7).unwrap();
    assert_eq!(file.read_u16(location).unwrap(), 7);
}

#[test]
fn test_read_past_size_fails() {
    let (_temp, path) = setup_temp_file();
    let mut file = open(&path);

    assert!(matches!(file.read_u32(0), Err(StoreError::OutOfBounds { .. })));
}

#[test]
fn test_byte_ranges_span_blocks() {
    let (_temp, path) = setup_temp_file();
    let mut file = open(&path);

    let data: Vec<u8> = (0..3 * BLOCK_SIZE).map(|i| (i % 251) as u8).collect();
    file.write_bytes(100, &data).unwrap();
    assert_eq!(file.block_count(), 4);

    let mut buffer = vec![0u8; data.len()];
    file.read_bytes(100, &mut buffer).unwrap();
    assert_eq!(buffer, data);
}

// =============================================================================
// Commit & Rollback Tests
// =============================================================================

#[test]
fn test_commit_persists_across_reopen() {
    let (_temp, path) = setup_temp_file();
    {
        let mut file = open(&path);
        file.allocate_block().unwrap();
        file.allocate_block().unwrap();
        file.write_u64(BLOCK_SIZE as u64 + 16, 77).unwrap();
        assert_eq!(file.commit().unwrap(), 2);
        assert_eq!(file.dirty_blocks(), 0);
        assert_eq!(file.disk_size(), 2 * BLOCK_SIZE as u64);
    }

    let mut file = open(&path);
    assert_eq!(file.block_count(), 2);
    assert_eq!(file.read_u64(BLOCK_SIZE as u64 + 16).unwrap(), 77);
}

#[test]
fn test_commit_runs_hooks_in_block_order() {
    let (_temp, path) = setup_temp_file();
    let hooks = RecordingHooks::default();
    let mut file = BlockFile::open(&path, false, 16, 16, hooks.clone()).unwrap();
    for _ in 0..4 {
        file.allocate_block().unwrap();
    }
    file.commit().unwrap();
    hooks.committed.lock().unwrap().clear();

    file.write_u8(3 * BLOCK_SIZE as u64 + 1, 1).unwrap();
    file.write_u8(BLOCK_SIZE as u64 + 1, 1).unwrap();
    file.write_u8(2 * BLOCK_SIZE as u64 + 1, 1).unwrap();
    file.commit().unwrap();

    assert_eq!(*hooks.committed.lock().unwrap(), vec![1, 2, 3]);
    // the hook may rewrite the block before it is written
    assert_eq!(file.read_u8(BLOCK_SIZE as u64).unwrap(), 0x7F);
}

#[test]
fn test_rollback_restores_committed_content() {
    let (_temp, path) = setup_temp_file();
    let mut file = open(&path);
    file.allocate_block().unwrap();
    file.write_u32(0, 1).unwrap();
    file.commit().unwrap();

    file.write_u32(0, 2).unwrap();
    file.allocate_block().unwrap();
    assert_eq!(file.rollback().unwrap(), 2);

    assert_eq!(file.read_u32(0).unwrap(), 1);
    assert_eq!(file.block_count(), 1);
    assert_eq!(file.dirty_blocks(), 0);
}

#[test]
fn test_rollback_of_never_committed_file() {
    let (_temp, path) = setup_temp_file();
    let mut file = open(&path);
    file.allocate_block().unwrap();
    file.write_u32(0, 1).unwrap();

    file.rollback().unwrap();

    assert_eq!(file.size(), 0);
    assert_eq!(file.cached_blocks(), 0);
}

#[test]
fn test_load_hook_failure_surfaces() {
    let (_temp, path) = setup_temp_file();
    {
        let mut file = open(&path);
        file.allocate_block().unwrap();
        file.allocate_block().unwrap();
        file.commit().unwrap();
    }

    let mut file = BlockFile::open(&path, false, 16, 16, RejectingHooks { rejected: 1 }).unwrap();
    assert!(file.block(0).is_ok());
    assert!(matches!(
        file.block(1),
        Err(StoreError::ChecksumMismatch { block: 1 })
    ));
}

#[test]
fn test_check_on_disk_bypasses_cache() {
    let (_temp, path) = setup_temp_file();
    let mut file = BlockFile::open(&path, false, 16, 16, RejectingHooks { rejected: 1 }).unwrap();
    file.allocate_block().unwrap();
    file.allocate_block().unwrap();
    file.commit().unwrap();

    // block 1 stays resident, only the disk copy is checked
    assert!(file.is_cached(1));
    assert!(file.block(1).is_ok());
    assert!(file.check_on_disk(0).is_ok());
    assert!(matches!(
        file.check_on_disk(1),
        Err(StoreError::ChecksumMismatch { block: 1 })
    ));

    // never committed
    file.allocate_block().unwrap();
    assert!(file.check_on_disk(2).is_ok());
}

#[test]
fn test_truncate_drops_everything() {
    let (_temp, path) = setup_temp_file();
    let mut file = open(&path);
    file.allocate_block().unwrap();
    file.commit().unwrap();

    file.truncate().unwrap();

    assert_eq!(file.size(), 0);
    assert_eq!(file.disk_size(), 0);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
}

// =============================================================================
// Cache Tests
// =============================================================================

#[test]
fn test_dirty_blocks_are_never_evicted() {
    let (_temp, path) = setup_temp_file();
    let mut file: BlockFile<NoHooks> = BlockFile::open(&path, false, 2, 16, NoHooks).unwrap();

    for _ in 0..4 {
        file.allocate_block().unwrap();
    }
    // every block is dirty, the cache grew past its capacity
    assert_eq!(file.cached_blocks(), 4);
    assert_eq!(file.dirty_blocks(), 4);

    file.commit().unwrap();
    file.allocate_block().unwrap();

    // the oldest clean block made room for the new one
    assert_eq!(file.cached_blocks(), 4);
    assert!(!file.is_cached(0));
    assert!(file.is_cached(4));
}

#[test]
fn test_evicted_block_reloads_from_disk() {
    let (_temp, path) = setup_temp_file();
    let mut file: BlockFile<NoHooks> = BlockFile::open(&path, false, 1, 16, NoHooks).unwrap();
    file.allocate_block().unwrap();
    file.write_u32(0, 11).unwrap();
    file.commit().unwrap();

    file.allocate_block().unwrap();
    file.commit().unwrap();
    file.allocate_block().unwrap();
    assert!(!file.is_cached(0));

    assert_eq!(file.read_u32(0).unwrap(), 11);
}

// =============================================================================
// Read-Only Tests
// =============================================================================

#[test]
fn test_read_only_file_rejects_writes() {
    let (_temp, path) = setup_temp_file();
    {
        let mut file = open(&path);
        file.allocate_block().unwrap();
        file.write_u32(0, 5).unwrap();
        file.commit().unwrap();
    }

    let mut file: BlockFile<NoHooks> = BlockFile::open(&path, true, 16, 16, NoHooks).unwrap();
    assert!(file.is_read_only());
    assert_eq!(file.read_u32(0).unwrap(), 5);
    assert!(matches!(file.write_u32(0, 6), Err(StoreError::ReadOnly)));
    assert!(matches!(file.allocate_block(), Err(StoreError::ReadOnly)));
    assert_eq!(file.commit().unwrap(), 0);
}
