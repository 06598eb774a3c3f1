// CompositeKey ordering tests
// Byte order of encoded keys must match (partition, timestamp) order.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use rand::seq::SliceRandom;
use stagebuf::{CompositeKey, DiskStore, OrderedStore, StoreConfig};

const PARTITIONS: &[&str] = &["", "a", "a\0", "a\0b", "a\u{1}", "ab", "b", "événement", "\u{10FFFF}"];

fn random_time(rng: &mut impl Rng) -> SystemTime {
    let offset = Duration::from_nanos(rng.gen_range(0..4_000_000_000_000_000_000u64));
    if rng.gen_bool(0.2) {
        UNIX_EPOCH - offset
    } else {
        UNIX_EPOCH + offset
    }
}

fn random_keys(n: usize) -> Vec<CompositeKey> {
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|_| {
            let partition = PARTITIONS.choose(&mut rng).unwrap();
            CompositeKey::new(*partition, random_time(&mut rng))
        })
        .collect()
}

// =============================================================================
// Test 1: Encoded order equals key order for every pair
// =============================================================================
#[test]
fn encoding_preserves_order() {
    let keys = random_keys(300);
    for a in &keys {
        let ea = a.encode();
        for b in &keys {
            assert_eq!(
                a.cmp(b),
                ea.cmp(&b.encode()),
                "{a:?} vs {b:?} disagree between key and byte order"
            );
        }
    }
}

// =============================================================================
// Test 2: Every key decodes back to itself
// =============================================================================
#[test]
fn decode_recovers_every_key() {
    for key in random_keys(500) {
        assert_eq!(CompositeKey::decode(&key.encode()).unwrap(), key);
    }
}

// =============================================================================
// Test 3: Same partition means same prefix, nothing else does
// =============================================================================
#[test]
fn partition_prefix_identifies_partition() {
    let keys = random_keys(200);
    for a in &keys {
        for b in &keys {
            let (ea, eb) = (a.encode(), b.encode());
            assert_eq!(
                a.partition == b.partition,
                CompositeKey::partition_of(&ea) == CompositeKey::partition_of(&eb)
            );
        }
    }
}

// =============================================================================
// Test 4: A store scan over shuffled inserts yields sorted, contiguous runs
// =============================================================================
#[test]
fn shuffled_inserts_scan_sorted() {
    let dir = tempfile::tempdir().unwrap();
    let store = DiskStore::open(dir.path(), StoreConfig::default()).unwrap();

    let mut keys = random_keys(400);
    keys.sort();
    keys.dedup();
    let mut shuffled = keys.clone();
    shuffled.shuffle(&mut rand::thread_rng());
    for key in &shuffled {
        store.append(&key.encode(), key.partition.as_bytes(), Duration::ZERO).unwrap();
    }

    let mut scanned = Vec::new();
    store
        .range(&CompositeKey::first(), &CompositeKey::last(), &mut |k, v| {
            let key = CompositeKey::decode(k).unwrap();
            assert_eq!(v, key.partition.as_bytes());
            scanned.push(key);
            false
        })
        .unwrap();
    assert_eq!(scanned, keys);

    // Each partition appears as one run
    let mut runs: Vec<&str> = scanned.iter().map(|k| k.partition.as_str()).collect();
    runs.dedup();
    let mut distinct = runs.clone();
    distinct.sort();
    distinct.dedup();
    assert_eq!(runs.len(), distinct.len());
}
