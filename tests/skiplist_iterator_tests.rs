// Skip list iterator tests
// Iteration follows level 0 in sorted order; seek lands on the first key >= target.

use stagebuf::iterator::StorageIterator;
use stagebuf::memtable::skiplist::SkipList;

fn collect_keys(sl: &SkipList) -> Vec<Vec<u8>> {
    let mut iter = sl.iter();
    let mut keys = Vec::new();
    while iter.is_valid() {
        keys.push(iter.key().to_vec());
        iter.next().unwrap();
    }
    keys
}

// =============================================================================
// Test 1: Empty iterator
// =============================================================================
#[test]
fn iterator_empty_skiplist_is_invalid() {
    let sl = SkipList::new();
    assert!(!sl.iter().is_valid());
}

// =============================================================================
// Test 2: Entries come out sorted regardless of insertion order
// =============================================================================
#[test]
fn iterator_yields_sorted_keys() {
    let mut sl = SkipList::new();
    for k in ["d", "a", "c", "b", "e"] {
        sl.insert(k.as_bytes().to_vec(), b"v".to_vec());
    }
    let keys = collect_keys(&sl);
    assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec(), b"e".to_vec()]);
}

// =============================================================================
// Test 3: Seek to an existing key and to a gap
// =============================================================================
#[test]
fn seek_lands_on_lower_bound() {
    let mut sl = SkipList::new();
    for k in ["b", "d", "f"] {
        sl.insert(k.as_bytes().to_vec(), k.as_bytes().to_vec());
    }

    let mut iter = sl.iter();
    iter.seek(b"d").unwrap();
    assert_eq!(iter.key(), b"d");

    iter.seek(b"c").unwrap();
    assert_eq!(iter.key(), b"d");
    assert_eq!(iter.value(), b"d");

    iter.seek(b"a").unwrap();
    assert_eq!(iter.key(), b"b");

    iter.seek(b"g").unwrap();
    assert!(!iter.is_valid());
}

// =============================================================================
// Test 4: Iterator exposes the expiry stamp
// =============================================================================
#[test]
fn iterator_reports_expiry() {
    let mut sl = SkipList::new();
    sl.insert_with_expiry(b"a".to_vec(), b"1".to_vec(), 500);
    sl.insert(b"b".to_vec(), b"2".to_vec());

    let mut iter = sl.iter();
    assert_eq!(iter.expires_at(), 500);
    iter.next().unwrap();
    assert_eq!(iter.expires_at(), 0);
}

// =============================================================================
// Test 5: Removed keys disappear from iteration
// =============================================================================
#[test]
fn iterator_skips_removed_keys() {
    let mut sl = SkipList::new();
    for i in 0..10u8 {
        sl.insert(vec![i], vec![i]);
    }
    for i in (0..10u8).step_by(2) {
        sl.remove(&[i]);
    }
    let keys = collect_keys(&sl);
    assert_eq!(keys, (1..10u8).step_by(2).map(|i| vec![i]).collect::<Vec<_>>());
}
