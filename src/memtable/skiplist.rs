use rand::Rng;

use crate::error::Result;
use crate::iterator::StorageIterator;

/// Maximum height of the skip list. LevelDB uses 12.
pub const MAX_HEIGHT: usize = 12;

/// Fixed per-entry overhead charged to `size_bytes` (the expiry stamp).
const ENTRY_OVERHEAD: usize = 8;

/// A single node in the skip list.
///
/// Each node has `height` forward pointers, stored as indices into the
/// arena. Level 0 contains all nodes (a regular linked list).
///
/// ```text
/// Level 2:  HEAD ──────────► 20 ────────────────► 50 ──────────► NIL
/// Level 1:  HEAD ──► 10 ──► 20 ────► 35 ────────► 50 ──► 60 ──► NIL
/// Level 0:  HEAD ──► 10 ──► 20 ──► 25 ──► 35 ──► 50 ──► 60 ──► 70 ► NIL
/// ```
struct SkipNode {
    key: Vec<u8>,
    value: Vec<u8>,
    /// Unix millis after which the entry is dead. 0 = never.
    expires_at: u64,
    forward: Vec<Option<usize>>,
}

/// A probabilistic sorted map from byte keys to byte values.
///
/// Nodes live in an arena addressed by index; removed slots go on a free
/// list and are reused by later inserts.
///
/// Average case: O(log n) insert, lookup and remove, O(n) iteration.
pub struct SkipList {
    head: [Option<usize>; MAX_HEIGHT],
    nodes: Vec<Option<SkipNode>>,
    free: Vec<usize>,
    height: usize,
    len: usize,
    size_bytes: usize,
}

impl Default for SkipList {
    fn default() -> Self {
        Self::new()
    }
}

impl SkipList {
    /// Create a new empty skip list.
    pub fn new() -> Self {
        SkipList {
            head: [None; MAX_HEIGHT],
            nodes: Vec::new(),
            free: Vec::new(),
            height: 1,
            len: 0,
            size_bytes: 0,
        }
    }

    /// Insert a key-value pair that never expires. Overwrites if the key exists.
    pub fn insert(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.insert_with_expiry(key, value, 0);
    }

    /// Insert a key-value pair with an expiry stamp (Unix millis, 0 = never).
    ///
    /// Algorithm:
    ///   1. Find the insertion point at each level (track predecessors)
    ///   2. Overwrite in place if the key is already present
    ///   3. Otherwise pick a random height and splice the node in
    pub fn insert_with_expiry(&mut self, key: Vec<u8>, value: Vec<u8>, expires_at: u64) {
        let preds = self.find_predecessors(&key);

        if let Some(idx) = self.next_of(preds[0], 0) {
            let node = self.node_mut(idx);
            if node.key == key {
                let old = node.value.len();
                let new = value.len();
                node.value = value;
                node.expires_at = expires_at;
                self.size_bytes = self.size_bytes - old + new;
                return;
            }
        }

        let height = Self::random_height();
        if height > self.height {
            // preds above the old height are already None (= head)
            self.height = height;
        }

        let forward = (0..height).map(|level| self.next_of(preds[level], level)).collect();
        self.size_bytes += key.len() + value.len() + ENTRY_OVERHEAD;
        let node = SkipNode {
            key,
            value,
            expires_at,
            forward,
        };
        let idx = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                slot
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };

        for (level, pred) in preds.iter().enumerate().take(height) {
            self.set_next(*pred, level, Some(idx));
        }
        self.len += 1;
    }

    /// Look up a key. Returns the value if found, expired or not.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.get_entry(key).map(|(value, _)| value)
    }

    /// Look up a key together with its expiry stamp.
    pub fn get_entry(&self, key: &[u8]) -> Option<(&[u8], u64)> {
        let idx = self.lower_bound(key)?;
        let node = self.node(idx);
        (node.key == key).then_some((node.value.as_slice(), node.expires_at))
    }

    /// Unlink a key. Returns its value if it was present.
    pub fn remove(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        let preds = self.find_predecessors(key);
        let idx = self.next_of(preds[0], 0)?;
        if self.node(idx).key != key {
            return None;
        }

        let forward = self.node(idx).forward.clone();
        for (level, next) in forward.into_iter().enumerate() {
            if self.next_of(preds[level], level) == Some(idx) {
                self.set_next(preds[level], level, next);
            }
        }

        while self.height > 1 && self.head[self.height - 1].is_none() {
            self.height -= 1;
        }

        let node = self.nodes[idx].take()?;
        self.free.push(idx);
        self.len -= 1;
        self.size_bytes -= node.key.len() + node.value.len() + ENTRY_OVERHEAD;
        Some(node.value)
    }

    /// Number of entries in the skip list.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the skip list is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Approximate memory usage in bytes.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Create an iterator over all entries in sorted order.
    pub fn iter(&self) -> SkipListIterator<'_> {
        SkipListIterator {
            list: self,
            current: self.head[0],
        }
    }

    /// First node with key >= target.
    fn lower_bound(&self, key: &[u8]) -> Option<usize> {
        let preds = self.find_predecessors(key);
        self.next_of(preds[0], 0)
    }

    /// For each level, the last node whose key is < target (None = head).
    fn find_predecessors(&self, key: &[u8]) -> [Option<usize>; MAX_HEIGHT] {
        let mut preds = [None; MAX_HEIGHT];
        let mut cur = None;
        for level in (0..self.height).rev() {
            while let Some(next) = self.next_of(cur, level) {
                if self.node(next).key.as_slice() < key {
                    cur = Some(next);
                } else {
                    break;
                }
            }
            preds[level] = cur;
        }
        preds
    }

    fn next_of(&self, from: Option<usize>, level: usize) -> Option<usize> {
        match from {
            None => self.head[level],
            Some(idx) => self.node(idx).forward.get(level).copied().flatten(),
        }
    }

    fn set_next(&mut self, from: Option<usize>, level: usize, to: Option<usize>) {
        match from {
            None => self.head[level] = to,
            Some(idx) => self.node_mut(idx).forward[level] = to,
        }
    }

    fn node(&self, idx: usize) -> &SkipNode {
        self.nodes[idx].as_ref().expect("skip list link to a freed slot")
    }

    fn node_mut(&mut self, idx: usize) -> &mut SkipNode {
        self.nodes[idx].as_mut().expect("skip list link to a freed slot")
    }

    /// Generate a random level for a new node.
    /// Each extra level has a 1/4 probability, as in LevelDB.
    fn random_height() -> usize {
        let mut rng = rand::thread_rng();
        let mut height = 1;
        while height < MAX_HEIGHT && rng.gen_ratio(1, 4) {
            height += 1;
        }
        height
    }
}

/// Iterator over skip list entries in sorted order.
///
/// Follows level 0 forward pointers; `seek` uses the upper levels.
pub struct SkipListIterator<'a> {
    list: &'a SkipList,
    current: Option<usize>,
}

impl SkipListIterator<'_> {
    /// Expiry stamp of the current entry. Only valid when is_valid() is true.
    pub fn expires_at(&self) -> u64 {
        self.current.map_or(0, |idx| self.list.node(idx).expires_at)
    }
}

impl StorageIterator for SkipListIterator<'_> {
    fn key(&self) -> &[u8] {
        self.current.map_or(&[][..], |idx| self.list.node(idx).key.as_slice())
    }

    fn value(&self) -> &[u8] {
        self.current.map_or(&[][..], |idx| self.list.node(idx).value.as_slice())
    }

    fn is_valid(&self) -> bool {
        self.current.is_some()
    }

    fn next(&mut self) -> Result<()> {
        if let Some(idx) = self.current {
            self.current = self.list.next_of(Some(idx), 0);
        }
        Ok(())
    }

    fn seek(&mut self, key: &[u8]) -> Result<()> {
        self.current = self.list.lower_bound(key);
        Ok(())
    }
}
