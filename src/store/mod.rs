//! The ordered byte store the buffer stages entries in.

pub mod disk;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub use disk::DiskStore;

use crate::error::Result;

/// Durable, thread-safe, ordered byte-key/byte-value store with per-entry TTL.
///
/// Expired entries are invisible to every read. Implementations may drop them
/// lazily; callers must tolerate entries vanishing between two reads.
pub trait OrderedStore: Send + Sync {
    /// Store `value` under `key` for `ttl`. A zero TTL never expires.
    fn append(&self, key: &[u8], value: &[u8], ttl: Duration) -> Result<()>;

    /// Visit live entries with `from <= key <= to` in ascending key order.
    /// `visit` returns true to stop early.
    fn range(
        &self,
        from: &[u8],
        to: &[u8],
        visit: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<()>;

    /// Remove entries. Each removal is atomic on its own; missing keys are ignored.
    fn delete(&self, keys: &[Vec<u8>]) -> Result<()>;

    /// Remove each `(key, value)` entry only if the key still holds exactly
    /// `value`. A key overwritten since it was read is kept. Returns how many
    /// entries were removed.
    fn delete_if_unchanged(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<usize>;

    /// Reclaim space held by expired entries. Returns how many were dropped.
    fn purge_expired(&self) -> Result<usize> {
        Ok(0)
    }

    /// Flush and release the store. Every later call fails with `Error::Closed`.
    fn close(&self) -> Result<()>;
}

/// Store tuning.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// fsync the log after every append instead of in batches.
    pub sync_writes: bool,
    /// Batch size for fsync when `sync_writes` is off.
    pub sync_every: usize,
    /// Log size in bytes below which `purge_expired` never rewrites it.
    pub log_rewrite_bytes: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            sync_writes: false,
            sync_every: 64,
            log_rewrite_bytes: 4 << 20,
        }
    }
}

/// Current wall clock in Unix millis.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Absolute expiry stamp for an entry written now with `ttl` (0 = never).
pub(crate) fn expiry_for(ttl: Duration) -> u64 {
    if ttl.is_zero() {
        return 0;
    }
    let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
    now_millis().saturating_add(millis)
}
