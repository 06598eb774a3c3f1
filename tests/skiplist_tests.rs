// Skip list tests
// Insert, lookup, overwrite, removal and size tracking.

use stagebuf::memtable::skiplist::SkipList;

// =============================================================================
// Test 1: Insert one key, get it back
// =============================================================================
#[test]
fn insert_one_key_get_it_back() {
    let mut sl = SkipList::new();
    sl.insert(b"hello".to_vec(), b"world".to_vec());
    assert_eq!(sl.get(b"hello"), Some(b"world".as_slice()));
    assert_eq!(sl.len(), 1);
}

// =============================================================================
// Test 2: Duplicate key overwrites in place
// =============================================================================
#[test]
fn insert_duplicate_key_overwrites() {
    let mut sl = SkipList::new();
    sl.insert(b"key".to_vec(), b"old".to_vec());
    sl.insert_with_expiry(b"key".to_vec(), b"new".to_vec(), 77);

    assert_eq!(sl.get_entry(b"key"), Some((b"new".as_slice(), 77)));
    assert_eq!(sl.len(), 1);
}

// =============================================================================
// Test 3: Missing key
// =============================================================================
#[test]
fn get_nonexistent_key_returns_none() {
    let mut sl = SkipList::new();
    sl.insert(b"a".to_vec(), b"1".to_vec());
    assert_eq!(sl.get(b"z"), None);
    assert_eq!(sl.get(b""), None);
}

// =============================================================================
// Test 4: 1000 keys in shuffled order all come back
// =============================================================================
#[test]
fn insert_1000_keys_get_all_back() {
    let mut sl = SkipList::new();
    // 7 is coprime with 1000, so this visits every i exactly once, out of order
    for n in 0..1000u32 {
        let i = (n * 7) % 1000;
        sl.insert(format!("key_{:05}", i).into_bytes(), format!("val_{}", i).into_bytes());
    }

    assert_eq!(sl.len(), 1000);
    for i in 0..1000u32 {
        let key = format!("key_{:05}", i);
        assert_eq!(sl.get(key.as_bytes()), Some(format!("val_{}", i).as_bytes()));
    }
}

// =============================================================================
// Test 5: Remove unlinks the key and keeps its neighbours
// =============================================================================
#[test]
fn remove_unlinks_only_that_key() {
    let mut sl = SkipList::new();
    for k in [b"a", b"b", b"c"] {
        sl.insert(k.to_vec(), k.to_vec());
    }

    assert_eq!(sl.remove(b"b"), Some(b"b".to_vec()));
    assert_eq!(sl.remove(b"b"), None);
    assert_eq!(sl.get(b"b"), None);
    assert_eq!(sl.get(b"a"), Some(b"a".as_slice()));
    assert_eq!(sl.get(b"c"), Some(b"c".as_slice()));
    assert_eq!(sl.len(), 2);
}

// =============================================================================
// Test 6: Remove everything, then reuse the freed slots
// =============================================================================
#[test]
fn remove_all_then_reinsert() {
    let mut sl = SkipList::new();
    for i in 0..200u32 {
        sl.insert(i.to_be_bytes().to_vec(), vec![1]);
    }
    for i in (0..200u32).rev() {
        assert!(sl.remove(&i.to_be_bytes()).is_some());
    }
    assert!(sl.is_empty());
    assert_eq!(sl.size_bytes(), 0);

    for i in 0..50u32 {
        sl.insert(i.to_be_bytes().to_vec(), vec![2]);
    }
    assert_eq!(sl.len(), 50);
    assert_eq!(sl.get(&10u32.to_be_bytes()), Some([2u8].as_slice()));
}

// =============================================================================
// Test 7: Size tracks inserts, overwrites and removals
// =============================================================================
#[test]
fn size_tracks_contents() {
    let mut sl = SkipList::new();
    assert_eq!(sl.size_bytes(), 0);

    sl.insert(b"key".to_vec(), b"small".to_vec());
    let small = sl.size_bytes();
    assert!(small >= 3 + 5);

    sl.insert(b"key".to_vec(), b"a much larger value".to_vec());
    assert!(sl.size_bytes() > small);

    sl.remove(b"key");
    assert_eq!(sl.size_bytes(), 0);
}
