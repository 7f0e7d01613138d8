//! Tests for Page
//!
//! These tests verify:
//! - Page initialization and entry registration
//! - Removal (tombstones and trailing cascade)
//! - Slot reuse with and without the reuse flag
//! - Digest sealing and verification

use pagestore::storage::{
    BlockHooks, Page, PageHooks, BLOCK_SIZE, FLAG_REUSE_EMPTY_ENTRIES, MAX_ENTRY_SIZE,
    PAGE_ENTRY_SIZE, PAGE_HEADER_SIZE, PAGE_LAYOUT_VERSION,
};
use pagestore::StoreError;

// =============================================================================
// Helper Functions
// =============================================================================

fn new_page(flags: u16) -> Page<Vec<u8>> {
    let mut page = Page::new(vec![0u8; BLOCK_SIZE]);
    page.initialize(flags);
    page
}

// =============================================================================
// Initialization Tests
// =============================================================================

#[test]
fn test_initialize_empty_page() {
    let page = new_page(0);

    assert_eq!(page.version(), PAGE_LAYOUT_VERSION);
    assert_eq!(page.flags(), 0);
    assert_eq!(page.entry_count(), 0);
    assert_eq!(page.row_count(), 0);
    assert_eq!(page.free_start() as usize, PAGE_HEADER_SIZE);
    assert_eq!(page.data_start() as usize, BLOCK_SIZE);
    assert_eq!(page.free_space(), MAX_ENTRY_SIZE);
    assert!(!page.is_blank());
}

#[test]
fn test_initialize_keeps_flags() {
    let page = new_page(FLAG_REUSE_EMPTY_ENTRIES);
    assert!(page.reuses_empty_entries());
    assert!(!new_page(0).reuses_empty_entries());
}

// =============================================================================
// Registration Tests
// =============================================================================

#[test]
fn test_register_places_data_from_the_end() {
    let mut page = new_page(0);

    let (first, first_offset) = page.register_entry(100).unwrap();
    let (second, second_offset) = page.register_entry(50).unwrap();

    assert_eq!((first, first_offset), (0, BLOCK_SIZE - 100));
    assert_eq!((second, second_offset), (1, BLOCK_SIZE - 150));
    assert_eq!(page.entry_count(), 2);
    assert_eq!(page.row(1), ((BLOCK_SIZE - 150) as u16, 50));
    assert_eq!(
        page.free_space(),
        BLOCK_SIZE - 150 - PAGE_HEADER_SIZE - 3 * PAGE_ENTRY_SIZE
    );
}

#[test]
fn test_register_zero_length_entry() {
    let mut page = new_page(0);
    let (entry, offset) = page.register_entry(0).unwrap();

    assert_eq!(entry, 0);
    assert_eq!(offset, BLOCK_SIZE);
    assert_eq!(page.position_for(0, 0).unwrap(), (BLOCK_SIZE, 0));
}

#[test]
fn test_register_largest_entry_fills_page() {
    let mut page = new_page(0);

    page.register_entry(MAX_ENTRY_SIZE).unwrap();

    assert_eq!(page.free_space(), 0);
    assert!(!page.can_store(0));
    assert!(matches!(page.register_entry(1), Err(StoreError::PageFull(1))));
}

#[test]
fn test_register_too_large_entry_fails() {
    let mut page = new_page(0);

    assert!(!page.can_store(MAX_ENTRY_SIZE + 1));
    assert!(matches!(
        page.register_entry(MAX_ENTRY_SIZE + 1),
        Err(StoreError::EntryTooLarge { max: MAX_ENTRY_SIZE, .. })
    ));
}

// =============================================================================
// Removal Tests
// =============================================================================

#[test]
fn test_remove_middle_entry_leaves_tombstone() {
    let mut page = new_page(0);
    page.register_entry(10).unwrap();
    page.register_entry(20).unwrap();
    page.register_entry(30).unwrap();

    assert_eq!(page.remove_entry(1, 1).unwrap(), 20);

    assert_eq!(page.entry_count(), 2);
    assert_eq!(page.row_count(), 3);
    assert_eq!(page.row(1), (0, 20));
    assert!(matches!(page.position_for(1, 1), Err(StoreError::EntryRemoved(1))));
    assert!(page.position_for(2, 2).is_ok());
}

#[test]
fn test_remove_last_entry_cascades_over_tombstones() {
    let mut page = new_page(0);
    page.register_entry(10).unwrap();
    page.register_entry(20).unwrap();
    page.register_entry(30).unwrap();

    page.remove_entry(1, 1).unwrap();
    page.remove_entry(2, 2).unwrap();

    assert_eq!(page.entry_count(), 1);
    assert_eq!(page.row_count(), 1);
    assert_eq!(page.free_start() as usize, PAGE_HEADER_SIZE + PAGE_ENTRY_SIZE);
    assert_eq!(page.data_start() as usize, BLOCK_SIZE - 10);
}

#[test]
fn test_remove_every_entry_restores_empty_page() {
    let mut page = new_page(0);
    page.register_entry(10).unwrap();
    page.register_entry(20).unwrap();

    page.remove_entry(0, 0).unwrap();
    page.remove_entry(1, 1).unwrap();

    assert_eq!(page.entry_count(), 0);
    assert_eq!(page.row_count(), 0);
    assert_eq!(page.free_space(), MAX_ENTRY_SIZE);
}

#[test]
fn test_remove_invalid_entries() {
    let mut page = new_page(0);
    page.register_entry(10).unwrap();
    page.register_entry(10).unwrap();
    page.remove_entry(0, 0).unwrap();

    assert!(matches!(page.remove_entry(0, 0), Err(StoreError::EntryRemoved(0))));
    assert!(matches!(page.remove_entry(5, 5), Err(StoreError::InvalidKey(5))));
    assert!(matches!(page.position_for(2, 2), Err(StoreError::InvalidKey(2))));
}

// =============================================================================
// Reuse Tests
// =============================================================================

#[test]
fn test_tombstone_reused_when_flag_set() {
    let mut page = new_page(FLAG_REUSE_EMPTY_ENTRIES);
    page.register_entry(40).unwrap();
    page.register_entry(20).unwrap();
    page.register_entry(10).unwrap();
    page.remove_entry(1, 1).unwrap();

    // a smaller entry takes the whole slot
    let (entry, offset) = page.register_entry(15).unwrap();

    assert_eq!(entry, 1);
    assert_eq!(offset, BLOCK_SIZE - 60);
    assert_eq!(page.position_for(1, 1).unwrap(), (BLOCK_SIZE - 60, 20));
    assert_eq!(page.row_count(), 3);
}

#[test]
fn test_tombstone_too_small_is_skipped() {
    let mut page = new_page(FLAG_REUSE_EMPTY_ENTRIES);
    page.register_entry(40).unwrap();
    page.register_entry(10).unwrap();
    page.remove_entry(0, 0).unwrap();

    let (entry, _) = page.register_entry(41).unwrap();
    assert_eq!(entry, 2);
}

#[test]
fn test_tombstone_ignored_without_flag() {
    let mut page = new_page(0);
    page.register_entry(40).unwrap();
    page.register_entry(10).unwrap();
    page.remove_entry(0, 0).unwrap();

    let before = page.free_space();
    let (entry, _) = page.register_entry(5).unwrap();

    assert_eq!(entry, 2);
    assert_eq!(page.free_space(), before - 5 - PAGE_ENTRY_SIZE);
}

#[test]
fn test_free_space_counts_tombstones_when_reusing() {
    let mut reusing = new_page(FLAG_REUSE_EMPTY_ENTRIES);
    let mut plain = new_page(0);
    for page in [&mut reusing, &mut plain] {
        page.register_entry(100).unwrap();
        page.register_entry(10).unwrap();
        page.remove_entry(0, 0).unwrap();
    }

    assert_eq!(reusing.free_space(), plain.free_space() + 100);
    assert!(reusing.can_store(100));
}

#[test]
fn test_full_page_accepts_entry_in_tombstone() {
    let mut page = new_page(FLAG_REUSE_EMPTY_ENTRIES);
    page.register_entry(100).unwrap();
    let rest = page.free_space();
    page.register_entry(rest).unwrap();
    assert_eq!(page.free_space(), 0);

    page.remove_entry(0, 0).unwrap();

    assert!(page.can_store(100));
    assert_eq!(page.register_entry(100).unwrap(), (0, BLOCK_SIZE - 100));
}

// =============================================================================
// Digest Tests
// =============================================================================

#[test]
fn test_sealed_page_verifies() {
    let mut bytes = vec![0u8; BLOCK_SIZE];
    let offset = {
        let mut page = Page::new(&mut bytes[..]);
        page.initialize(0);
        let (_, offset) = page.register_entry(4).unwrap();
        page.seal();
        offset
    };
    assert!(Page::new(&bytes[..]).verify(1).is_ok());

    // the digest covers entry data
    bytes[offset] ^= 0xFF;
    assert!(matches!(
        Page::new(&bytes[..]).verify(3),
        Err(StoreError::ChecksumMismatch { block: 3 })
    ));
}

#[test]
fn test_blank_block_verifies() {
    let page = Page::new(vec![0u8; BLOCK_SIZE]);
    assert!(page.is_blank());
    assert!(page.verify(1).is_ok());
}

#[test]
fn test_unversioned_block_with_data_is_corrupted() {
    let mut bytes = vec![0u8; BLOCK_SIZE];
    bytes[100] = 1;
    assert!(matches!(Page::new(bytes).verify(1), Err(StoreError::Corrupted(_))));
}

#[test]
fn test_unknown_version_rejected() {
    let mut bytes = vec![0u8; BLOCK_SIZE];
    bytes[1] = 9;
    assert!(matches!(
        Page::new(bytes).verify(1),
        Err(StoreError::UnsupportedVersion { found: 9, expected: 1 })
    ));
}

// =============================================================================
// Hook Tests
// =============================================================================

#[test]
fn test_hooks_seal_pages_on_commit() {
    let mut bytes = vec![0u8; BLOCK_SIZE];
    {
        let mut page = Page::new(&mut bytes[..]);
        page.initialize(0);
        page.register_entry(8).unwrap();
    }
    assert!(PageHooks.on_load(1, &bytes).is_err());

    PageHooks.on_commit(1, &mut bytes);

    assert!(PageHooks.on_load(1, &bytes).is_ok());
}

#[test]
fn test_hooks_skip_header_block() {
    let mut bytes = vec![0u8; BLOCK_SIZE];
    bytes[0] = 0xFF;
    bytes[5] = 0x01;

    assert!(PageHooks.on_load(0, &bytes).is_ok());
    let before = bytes.clone();
    PageHooks.on_commit(0, &mut bytes);
    assert_eq!(bytes, before);
}

#[test]
fn test_hooks_leave_blank_blocks_alone() {
    let mut bytes = vec![0u8; BLOCK_SIZE];
    PageHooks.on_commit(2, &mut bytes);
    assert!(bytes.iter().all(|&b| b == 0));
    assert!(PageHooks.on_load(2, &bytes).is_ok());
}
