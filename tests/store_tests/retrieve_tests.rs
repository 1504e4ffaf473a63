//! Tests for CapsuleStore::retrieve_and_clear
//!
//! These tests verify:
//! - Empty and uninitialized stores report zero capsules
//! - Round-trip of persisted capsules in append order
//! - BufferTooSmall reports the required size and leaves the store alone
//! - Structural validation rejects corrupt stores
//! - The store is logically cleared after a drain

use capsule_persist::capsule::{self, HEADER_SIZE, IMAGE_SIZE_OFFSET};
use capsule_persist::store::StorageHeader;
use capsule_persist::{Capsule, CapsuleError, CapsuleStore, Config, MemoryFlash, StoreStatus};

const BLOCK_SIZE: usize = 4096;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_store(blocks: usize) -> CapsuleStore<MemoryFlash> {
    let config = Config::builder()
        .region_size((BLOCK_SIZE * blocks) as u64)
        .build();
    CapsuleStore::open(MemoryFlash::new(BLOCK_SIZE, blocks), config).unwrap()
}

fn capsule_of_len(total: usize, fill: u8) -> Capsule {
    Capsule::new([fill; 16], 0, &vec![fill; total - HEADER_SIZE]).unwrap()
}

fn persist_all(store: &mut CapsuleStore<MemoryFlash>, capsules: &[Capsule]) -> Vec<u8> {
    let mut expected = Vec::new();
    for c in capsules {
        store.persist(c).unwrap();
        expected.extend_from_slice(c.as_bytes());
    }
    expected
}

// =============================================================================
// Empty Store Tests
// =============================================================================

#[test]
fn test_uninitialized_store_is_empty() {
    let mut store = setup_store(4);
    let mut buf = vec![0u8; 128];

    let retrieved = store.retrieve_and_clear(&mut buf).unwrap();

    assert_eq!(retrieved.count, 0);
    assert_eq!(retrieved.len, 0);
    assert!(retrieved.is_empty());
    assert_eq!(store.device().write_count(), 0);
    assert_eq!(store.status().unwrap(), StoreStatus::Uninitialized);
}

#[test]
fn test_uninitialized_store_with_empty_buffer() {
    let mut store = setup_store(4);

    let retrieved = store.retrieve_and_clear(&mut []).unwrap();
    assert!(retrieved.is_empty());
}

#[test]
fn test_cleared_store_is_empty() {
    let mut store = setup_store(4);
    store.persist(&capsule_of_len(100, 0xA1)).unwrap();
    store.erase().unwrap();

    let mut buf = vec![0u8; 128];
    let retrieved = store.retrieve_and_clear(&mut buf).unwrap();

    assert!(retrieved.is_empty());
}

// =============================================================================
// Round-Trip Tests
// =============================================================================

#[test]
fn test_retrieve_two_capsules() {
    let mut store = setup_store(4);
    let a = capsule_of_len(100, 0xA1);
    let b = capsule_of_len(50, 0xB2);
    let expected = persist_all(&mut store, &[a, b]);

    let mut buf = vec![0u8; 150];
    let retrieved = store.retrieve_and_clear(&mut buf).unwrap();

    assert_eq!(retrieved.count, 2);
    assert_eq!(retrieved.len, 150);
    assert_eq!(buf, expected);
    assert_eq!(store.header().unwrap(), StorageHeader::with_contents(0, 0));
}

#[test]
fn test_retrieve_preserves_append_order() {
    let mut store = setup_store(16);
    let capsules: Vec<Capsule> = (0..20u8)
        .map(|i| capsule_of_len(HEADER_SIZE + 37 * i as usize + 1, i))
        .collect();
    let expected = persist_all(&mut store, &capsules);

    let mut buf = vec![0u8; expected.len() + 500];
    let retrieved = store.retrieve_and_clear(&mut buf).unwrap();

    assert_eq!(retrieved.count, 20);
    assert_eq!(&buf[..retrieved.len], &expected[..]);

    let walked: Vec<&[u8]> = capsule::capsules(&buf[..retrieved.len])
        .map(|c| c.unwrap())
        .collect();
    assert_eq!(walked.len(), 20);
    for (walked, original) in walked.iter().zip(&capsules) {
        assert_eq!(*walked, original.as_bytes());
    }
}

#[test]
fn test_retrieve_larger_than_one_block() {
    let mut store = setup_store(8);
    let capsules = vec![
        capsule_of_len(3000, 0x01),
        capsule_of_len(5000, 0x02),
        capsule_of_len(700, 0x03),
    ];
    let expected = persist_all(&mut store, &capsules);

    let (count, data) = store.drain().unwrap();

    assert_eq!(count, 3);
    assert_eq!(data, expected);
}

#[test]
fn test_second_retrieve_is_empty() {
    let mut store = setup_store(4);
    persist_all(&mut store, &[capsule_of_len(100, 0xA1)]);

    let mut buf = vec![0u8; 100];
    store.retrieve_and_clear(&mut buf).unwrap();
    let again = store.retrieve_and_clear(&mut buf).unwrap();

    assert!(again.is_empty());
}

#[test]
fn test_persist_after_retrieve_starts_over() {
    let mut store = setup_store(4);
    persist_all(&mut store, &[capsule_of_len(100, 0xA1), capsule_of_len(50, 0xB2)]);
    store.drain().unwrap();

    let c = capsule_of_len(80, 0xC3);
    store.persist(&c).unwrap();

    assert_eq!(store.header().unwrap(), StorageHeader::with_contents(1, 80));
    assert_eq!(&store.device().as_bytes()[4096..4176], c.as_bytes());

    let (count, data) = store.drain().unwrap();
    assert_eq!(count, 1);
    assert_eq!(data, c.as_bytes());
}

#[test]
fn test_drain_uninitialized_store() {
    let mut store = setup_store(4);

    let (count, data) = store.drain().unwrap();

    assert_eq!(count, 0);
    assert!(data.is_empty());
}

// =============================================================================
// Buffer Sizing Tests
// =============================================================================

#[test]
fn test_buffer_too_small_reports_required() {
    let mut store = setup_store(4);
    let expected = persist_all(&mut store, &[capsule_of_len(100, 0xA1), capsule_of_len(50, 0xB2)]);
    let writes = store.device().write_count();

    let mut small = vec![0u8; 149];
    let result = store.retrieve_and_clear(&mut small);

    match result {
        Err(CapsuleError::BufferTooSmall { required }) => assert_eq!(required, 150),
        other => panic!("expected BufferTooSmall, got {:?}", other),
    }
    assert_eq!(store.device().write_count(), writes);
    assert_eq!(store.header().unwrap(), StorageHeader::with_contents(2, 150));

    let mut right = vec![0u8; 150];
    let retrieved = store.retrieve_and_clear(&mut right).unwrap();
    assert_eq!(retrieved.count, 2);
    assert_eq!(right, expected);
}

#[test]
fn test_buffer_larger_than_needed() {
    let mut store = setup_store(4);
    let expected = persist_all(&mut store, &[capsule_of_len(64, 0x5A)]);

    let mut buf = vec![0xEEu8; 1000];
    let retrieved = store.retrieve_and_clear(&mut buf).unwrap();

    assert_eq!(retrieved.len, 64);
    assert_eq!(&buf[..64], &expected[..]);
    assert!(buf[64..].iter().all(|&b| b == 0xEE));
}

// =============================================================================
// Corruption Detection Tests
// =============================================================================

#[test]
fn test_corrupt_declared_length_detected() {
    let mut store = setup_store(4);
    persist_all(&mut store, &[capsule_of_len(100, 0xA1), capsule_of_len(50, 0xB2)]);

    // Second capsule now claims 60 bytes: sum != capsule_array_size
    let offset = BLOCK_SIZE + 100 + IMAGE_SIZE_OFFSET;
    store.device_mut().corrupt(offset, &60u32.to_le_bytes());
    let writes = store.device().write_count();

    let mut buf = vec![0u8; 1024];
    let result = store.retrieve_and_clear(&mut buf);

    assert!(matches!(result, Err(CapsuleError::CorruptStore(_))));
    assert!(buf.iter().all(|&b| b == 0));
    assert_eq!(store.device().write_count(), writes);
    assert_eq!(store.header().unwrap(), StorageHeader::with_contents(2, 150));
}

#[test]
fn test_short_declared_length_detected() {
    let mut store = setup_store(4);
    persist_all(&mut store, &[capsule_of_len(100, 0xA1), capsule_of_len(50, 0xB2)]);

    // First capsule shrinks to 90: the pair no longer adds up
    store
        .device_mut()
        .corrupt(BLOCK_SIZE + IMAGE_SIZE_OFFSET, &90u32.to_le_bytes());

    let result = store.drain();
    assert!(matches!(result, Err(CapsuleError::CorruptStore(_))));
}

#[test]
fn test_zero_declared_length_detected() {
    let mut store = setup_store(4);
    persist_all(&mut store, &[capsule_of_len(100, 0xA1)]);

    store
        .device_mut()
        .corrupt(BLOCK_SIZE + IMAGE_SIZE_OFFSET, &0u32.to_le_bytes());

    assert!(matches!(store.status(), Err(CapsuleError::CorruptStore(_))));
}

#[test]
fn test_count_mismatch_detected() {
    let mut store = setup_store(4);
    persist_all(&mut store, &[capsule_of_len(100, 0xA1), capsule_of_len(50, 0xB2)]);

    // Header claims a third capsule that was never written
    let header = StorageHeader::with_contents(3, 150);
    let block = header.encode_block(BLOCK_SIZE).unwrap();
    store.device_mut().corrupt(0, &block);

    let result = store.drain();
    assert!(matches!(result, Err(CapsuleError::CorruptStore(_))));
}

#[test]
fn test_missing_capsule_count_detected() {
    let mut store = setup_store(4);
    persist_all(&mut store, &[capsule_of_len(100, 0xA1), capsule_of_len(50, 0xB2)]);

    // One capsule cannot account for 150 bytes
    let block = StorageHeader::with_contents(1, 150).encode_block(BLOCK_SIZE).unwrap();
    store.device_mut().corrupt(0, &block);

    assert!(matches!(store.status(), Err(CapsuleError::CorruptStore(_))));
}

#[test]
fn test_array_size_past_region_detected() {
    let mut store = setup_store(2);
    persist_all(&mut store, &[capsule_of_len(100, 0xA1)]);

    let block = StorageHeader::with_contents(1, 1 << 20).encode_block(BLOCK_SIZE).unwrap();
    store.device_mut().corrupt(0, &block);

    let result = store.drain();
    assert!(matches!(result, Err(CapsuleError::CorruptStore(_))));
}

#[test]
fn test_magic_with_erased_data_detected() {
    let mut store = setup_store(4);

    // Valid magic over an erased capsule area
    let block = StorageHeader::with_contents(1, 100).encode_block(BLOCK_SIZE).unwrap();
    store.device_mut().corrupt(0, &block);

    let mut buf = vec![0u8; 100];
    let result = store.retrieve_and_clear(&mut buf);
    assert!(matches!(result, Err(CapsuleError::CorruptStore(_))));
}

// =============================================================================
// Status Tests
// =============================================================================

#[test]
fn test_status_reports_usage() {
    let mut store = setup_store(4);
    persist_all(&mut store, &[capsule_of_len(100, 0xA1), capsule_of_len(50, 0xB2)]);

    let status = store.status().unwrap();

    assert_eq!(
        status,
        StoreStatus::Ready {
            capsule_count: 2,
            capsule_array_size: 150,
            free_bytes: 3 * BLOCK_SIZE as u64 - 150,
        }
    );
}
