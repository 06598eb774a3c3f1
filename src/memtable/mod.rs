pub mod skiplist;

use skiplist::{SkipList, SkipListIterator};

use crate::iterator::StorageIterator;
use crate::types::{Key, Value};
use crate::wal::WALRecord;

/// In-memory sorted index of the store's live entries. Wraps a SkipList.
///
/// Every entry carries an expiry stamp in Unix millis (0 = never). Expired
/// entries stay in the list until `purge_expired` runs, but every read path
/// treats them as absent.
pub struct MemTable {
    data: SkipList,
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MemTable {
    /// Create a new empty memtable.
    pub fn new() -> Self {
        MemTable {
            data: SkipList::new(),
        }
    }

    /// Insert or replace an entry.
    pub fn put(&mut self, key: Key, value: Value, expires_at: u64) {
        self.data.insert_with_expiry(key, value, expires_at);
    }

    /// Look up a key as of `now`. Returns None if missing or expired.
    pub fn get(&self, key: &[u8], now: u64) -> Option<&[u8]> {
        match self.data.get_entry(key) {
            Some((value, expires_at)) if is_live(expires_at, now) => Some(value),
            _ => None,
        }
    }

    /// Look up a key's stored value, expired or not.
    pub fn peek(&self, key: &[u8]) -> Option<&[u8]> {
        self.data.get(key)
    }

    /// Remove a key. Returns whether it was present.
    pub fn delete(&mut self, key: &[u8]) -> bool {
        self.data.remove(key).is_some()
    }

    /// Collect up to `limit` live entries with `from <= key <= to`, in order.
    pub fn scan(&self, from: &[u8], to: &[u8], now: u64, limit: usize) -> Vec<(Key, Value)> {
        let mut out = Vec::new();
        let mut iter = self.data.iter();
        // Seeking an in-memory list cannot fail
        let _ = iter.seek(from);
        while iter.is_valid() && out.len() < limit {
            if iter.key() > to {
                break;
            }
            if is_live(iter.expires_at(), now) {
                out.push((iter.key().to_vec(), iter.value().to_vec()));
            }
            let _ = iter.next();
        }
        out
    }

    /// Drop every entry expired as of `now`. Returns how many were dropped.
    pub fn purge_expired(&mut self, now: u64) -> usize {
        let mut expired = Vec::new();
        let mut iter = self.data.iter();
        while iter.is_valid() {
            if !is_live(iter.expires_at(), now) {
                expired.push(iter.key().to_vec());
            }
            let _ = iter.next();
        }
        for key in &expired {
            self.data.remove(key);
        }
        expired.len()
    }

    /// Number of entries still live as of `now`.
    pub fn live_len(&self, now: u64) -> usize {
        let mut count = 0;
        let mut iter = self.data.iter();
        while iter.is_valid() {
            if is_live(iter.expires_at(), now) {
                count += 1;
            }
            let _ = iter.next();
        }
        count
    }

    /// Bytes a log holding exactly the current entries would take.
    pub fn log_size(&self) -> u64 {
        let mut size = 0u64;
        let mut iter = self.data.iter();
        while iter.is_valid() {
            size += WALRecord::put_size(iter.key(), iter.value()) as u64;
            let _ = iter.next();
        }
        size
    }

    /// Sorted iterator over all entries, expired ones included.
    pub fn iter(&self) -> SkipListIterator<'_> {
        self.data.iter()
    }

    /// Number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the memtable holds no entries.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current memory usage in bytes.
    pub fn size(&self) -> usize {
        self.data.size_bytes()
    }
}

/// An entry is live while `now` is strictly before its expiry.
pub fn is_live(expires_at: u64, now: u64) -> bool {
    expires_at == 0 || now < expires_at
}
