//! Tests for DiskHashMap
//!
//! These tests verify:
//! - Put/get semantics, including several values per key
//! - Long bucket chains and records spread over many blocks
//! - Reopening a map from its header location
//! - Table size normalization and corrupted headers

use std::path::{Path, PathBuf};
use pagestore::index::{DiskHashMap, MAX_TABLE_SIZE};
use pagestore::storage::{BlockFile, NoHooks, BLOCK_SIZE};
use pagestore::StoreError;
use tempfile::TempDir;

type StringMap = DiskHashMap<String, u64>;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_file() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("map.index");
    (temp_dir, path)
}

fn open_file(path: &Path) -> BlockFile<NoHooks> {
    BlockFile::open(path, false, 64, 16, NoHooks).unwrap()
}

fn key(i: u64) -> String {
    format!("http://example.org/resource/{}", i)
}

// =============================================================================
// Creation Tests
// =============================================================================

#[test]
fn test_create_keeps_block_zero_free() {
    let (_temp, path) = setup_temp_file();
    let mut file = open_file(&path);

    let map = StringMap::create(&mut file, 1000, 0.75).unwrap();

    assert_eq!(map.location(), BLOCK_SIZE as u64);
    assert_eq!(map.table_size(), 1024);
    assert_eq!(map.threshold(), 768);
    assert_eq!(map.load_factor(), 0.75);
    assert!(map.is_empty());
}

#[test]
fn test_table_size_is_capped() {
    let (_temp, path) = setup_temp_file();
    let mut file = open_file(&path);

    let huge = StringMap::create(&mut file, u32::MAX, 0.5).unwrap();
    let tiny = StringMap::create(&mut file, 0, 0.5).unwrap();

    assert_eq!(huge.table_size(), MAX_TABLE_SIZE);
    assert_eq!(tiny.table_size(), 1);
}

#[test]
fn test_open_rejects_invalid_table_size() {
    let (_temp, path) = setup_temp_file();
    let mut file = open_file(&path);
    file.allocate_block().unwrap();

    let result = StringMap::open(&mut file, 0);
    assert!(matches!(result, Err(StoreError::Corrupted(_))));
}

// =============================================================================
// Put / Get Tests
// =============================================================================

#[test]
fn test_get_on_empty_map() {
    let (_temp, path) = setup_temp_file();
    let mut file = open_file(&path);
    let map = StringMap::create(&mut file, 16, 0.75).unwrap();

    assert_eq!(map.get(&mut file, &key(1)).unwrap(), None);
    assert!(!map.contains_key(&mut file, &key(1)).unwrap());
    assert_eq!(map.get_all(&mut file, &key(1)).unwrap().count(), 0);
}

#[test]
fn test_put_then_get() {
    let (_temp, path) = setup_temp_file();
    let mut file = open_file(&path);
    let mut map = StringMap::create(&mut file, 16, 0.75).unwrap();

    assert!(map.put(&mut file, &key(1), &100).unwrap());
    assert!(map.put(&mut file, &key(2), &200).unwrap());

    assert_eq!(map.len(), 2);
    assert_eq!(map.get(&mut file, &key(1)).unwrap(), Some(100));
    assert_eq!(map.get(&mut file, &key(2)).unwrap(), Some(200));
    assert!(map.contains_key(&mut file, &key(2)).unwrap());
    assert_eq!(map.get(&mut file, &key(3)).unwrap(), None);
}

#[test]
fn test_duplicate_record_is_not_added() {
    let (_temp, path) = setup_temp_file();
    let mut file = open_file(&path);
    let mut map = StringMap::create(&mut file, 16, 0.75).unwrap();

    assert!(map.put(&mut file, &key(1), &100).unwrap());
    assert!(!map.put(&mut file, &key(1), &100).unwrap());
    assert_eq!(map.len(), 1);
}

#[test]
fn test_key_holds_several_values_in_order() {
    let (_temp, path) = setup_temp_file();
    let mut file = open_file(&path);
    let mut map = StringMap::create(&mut file, 16, 0.75).unwrap();

    map.put(&mut file, &key(1), &3).unwrap();
    map.put(&mut file, &key(2), &9).unwrap();
    map.put(&mut file, &key(1), &1).unwrap();
    map.put(&mut file, &key(1), &2).unwrap();

    let values: Vec<u64> = map
        .get_all(&mut file, &key(1))
        .unwrap()
        .collect::<pagestore::Result<_>>()
        .unwrap();
    assert_eq!(values, vec![3, 1, 2]);
    assert_eq!(map.get(&mut file, &key(1)).unwrap(), Some(3));
}

#[test]
fn test_try_put_keeps_first_value() {
    let (_temp, path) = setup_temp_file();
    let mut file = open_file(&path);
    let mut map = StringMap::create(&mut file, 16, 0.75).unwrap();

    assert!(map.try_put(&mut file, &key(1), &1).unwrap());
    assert!(!map.try_put(&mut file, &key(1), &2).unwrap());

    assert_eq!(map.len(), 1);
    assert_eq!(map.get(&mut file, &key(1)).unwrap(), Some(1));
}

#[test]
fn test_record_larger_than_a_block_fails() {
    let (_temp, path) = setup_temp_file();
    let mut file = open_file(&path);
    let mut map: DiskHashMap<u32, Vec<u8>> = DiskHashMap::create(&mut file, 16, 0.75).unwrap();

    let result = map.put(&mut file, &1, &vec![0u8; BLOCK_SIZE]);

    assert!(matches!(result, Err(StoreError::EntryTooLarge { .. })));
    assert!(map.is_empty());
}

// =============================================================================
// Scale Tests
// =============================================================================

#[test]
fn test_long_chains_in_a_small_table() {
    let (_temp, path) = setup_temp_file();
    let mut file = open_file(&path);
    let mut map = StringMap::create(&mut file, 4, 0.75).unwrap();

    for i in 0..3000 {
        assert!(map.put(&mut file, &key(i), &(i * 7)).unwrap());
    }

    // past the threshold the table keeps its size
    assert_eq!(map.table_size(), 4);
    assert_eq!(map.len(), 3000);
    assert!(file.block_count() > 10);
    for i in 0..3000 {
        assert_eq!(map.get(&mut file, &key(i)).unwrap(), Some(i * 7));
    }
}

#[test]
fn test_maps_share_a_file() {
    let (_temp, path) = setup_temp_file();
    let mut file = open_file(&path);
    let mut names = StringMap::create(&mut file, 64, 0.75).unwrap();
    let mut numbers: DiskHashMap<u64, u64> = DiskHashMap::create(&mut file, 64, 0.75).unwrap();

    for i in 0..500 {
        names.put(&mut file, &key(i), &i).unwrap();
        numbers.put(&mut file, &i, &(i + 1)).unwrap();
    }

    for i in 0..500 {
        assert_eq!(names.get(&mut file, &key(i)).unwrap(), Some(i));
        assert_eq!(numbers.get(&mut file, &i).unwrap(), Some(i + 1));
    }
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_reopen_from_location() {
    let (_temp, path) = setup_temp_file();
    let location = {
        let mut file = open_file(&path);
        let mut map = StringMap::create(&mut file, 32, 0.75).unwrap();
        for i in 0..200 {
            map.put(&mut file, &key(i), &i).unwrap();
        }
        file.commit().unwrap();
        map.location()
    };

    let mut file = open_file(&path);
    let mut map = StringMap::open(&mut file, location).unwrap();

    assert_eq!(map.len(), 200);
    assert_eq!(map.table_size(), 32);
    assert_eq!(map.get(&mut file, &key(150)).unwrap(), Some(150));

    // new records go after the reloaded ones
    map.put(&mut file, &key(1000), &1000).unwrap();
    for i in 0..200 {
        assert_eq!(map.get(&mut file, &key(i)).unwrap(), Some(i));
    }
    assert_eq!(map.get(&mut file, &key(1000)).unwrap(), Some(1000));
}
