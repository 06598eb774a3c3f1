use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::memtable::MemTable;
use crate::store::{OrderedStore, StoreConfig, expiry_for, now_millis};
use crate::wal::reader::WALReader;
use crate::wal::writer::WALWriter;
use crate::wal::{RecordType, SyncPolicy, WALRecord};

/// Name of the log file inside the store directory.
pub const WAL_FILE: &str = "buffer.wal";

/// Entries collected per lock acquisition during a range scan.
const SCAN_BATCH: usize = 256;

/// The log is rewritten once it is this many times larger than the live set.
const REWRITE_RATIO: u64 = 2;

/// An ordered store backed by a skip-list index and a write-ahead log.
///
/// Every mutation is logged before it is applied to the index, so the index
/// can be rebuilt by replaying the log on open. Open also rewrites the log
/// with only the live entries, which keeps it from growing across restarts.
///
/// Range scans hold the read lock for one batch at a time, so a visitor may
/// append to or delete from the same store.
///
/// `purge_expired` also rewrites the log once it reaches
/// `StoreConfig::log_rewrite_bytes` and is mostly dead records, so a
/// long-running store's log tracks its live set rather than its history.
pub struct DiskStore {
    dir: PathBuf,
    policy: SyncPolicy,
    log_rewrite_bytes: u64,
    inner: RwLock<Inner>,
}

struct Inner {
    table: MemTable,
    /// None once closed.
    wal: Option<WALWriter>,
}

impl DiskStore {
    /// Open the store in `dir`, creating it if needed, and replay its log.
    pub fn open(dir: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let path = dir.join(WAL_FILE);
        let policy = if config.sync_writes {
            SyncPolicy::EveryWrite
        } else {
            SyncPolicy::EveryNWrites(config.sync_every.max(1))
        };

        let mut table = MemTable::new();
        if path.exists() {
            let reader = WALReader::new(&path)?;
            let mut replayed = 0usize;
            for record in reader.iter() {
                match record.record_type {
                    RecordType::Put => table.put(record.key, record.value, record.expires_at),
                    RecordType::Delete => {
                        table.delete(&record.key);
                    }
                }
                replayed += 1;
            }
            let torn = reader.trailing_bytes();
            if torn > 0 {
                warn!(path = %path.display(), bytes = torn, "dropping torn tail of log");
            }
            let expired = table.purge_expired(now_millis());
            info!(
                path = %path.display(),
                replayed,
                live = table.len(),
                expired,
                "replayed store log"
            );
        }

        Self::checkpoint(&path, &table)?;
        let wal = WALWriter::new(&path, policy)?;

        Ok(DiskStore {
            dir,
            policy,
            log_rewrite_bytes: config.log_rewrite_bytes,
            inner: RwLock::new(Inner {
                table,
                wal: Some(wal),
            }),
        })
    }

    /// Replace the log at `path` with one holding exactly the entries of `table`.
    fn checkpoint(path: &Path, table: &MemTable) -> Result<()> {
        use crate::iterator::StorageIterator;

        let tmp = path.with_extension("wal.tmp");
        let mut writer = WALWriter::create(&tmp, SyncPolicy::EveryNWrites(usize::MAX))?;
        let mut iter = table.iter();
        while iter.is_valid() {
            writer.append(&WALRecord::put(
                iter.key().to_vec(),
                iter.value().to_vec(),
                iter.expires_at(),
            ))?;
            iter.next()?;
        }
        writer.sync()?;
        drop(writer);
        fs::rename(&tmp, path)?;
        debug!(path = %path.display(), entries = table.len(), "rewrote store log");
        Ok(())
    }

    /// Swap the log for a compacted copy if it is large and mostly dead.
    fn maybe_rewrite_log(&self, inner: &mut Inner) -> Result<()> {
        let Some(wal) = inner.wal.as_ref() else {
            return Err(Error::Closed);
        };
        let logged = wal.offset();
        if logged < self.log_rewrite_bytes {
            return Ok(());
        }
        let live = inner.table.log_size();
        if logged < live.saturating_mul(REWRITE_RATIO) {
            return Ok(());
        }

        let path = self.dir.join(WAL_FILE);
        Self::checkpoint(&path, &inner.table)?;
        // The old writer now points at the replaced file
        inner.wal = None;
        inner.wal = Some(WALWriter::new(&path, self.policy)?);
        info!(path = %path.display(), before = logged, after = live, "compacted store log");
        Ok(())
    }

    /// Directory the store lives in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        self.inner.read().table.live_len(now_millis())
    }

    /// Whether the store holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up one live entry.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let inner = self.inner.read();
        if inner.wal.is_none() {
            return Err(Error::Closed);
        }
        Ok(inner.table.get(key, now_millis()).map(<[u8]>::to_vec))
    }
}

impl OrderedStore for DiskStore {
    fn append(&self, key: &[u8], value: &[u8], ttl: Duration) -> Result<()> {
        let record = WALRecord::put(key.to_vec(), value.to_vec(), expiry_for(ttl));
        let mut inner = self.inner.write();
        let Inner { table, wal } = &mut *inner;
        let wal = wal.as_mut().ok_or(Error::Closed)?;
        wal.append(&record)?;
        table.put(record.key, record.value, record.expires_at);
        Ok(())
    }

    fn range(
        &self,
        from: &[u8],
        to: &[u8],
        visit: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) -> Result<()> {
        let mut cursor = from.to_vec();
        loop {
            let batch = {
                let inner = self.inner.read();
                if inner.wal.is_none() {
                    return Err(Error::Closed);
                }
                inner.table.scan(&cursor, to, now_millis(), SCAN_BATCH)
            };

            for (key, value) in &batch {
                if visit(key, value) {
                    return Ok(());
                }
            }

            match batch.last() {
                Some((last, _)) if batch.len() == SCAN_BATCH => cursor = successor(last),
                _ => return Ok(()),
            }
        }
    }

    fn delete(&self, keys: &[Vec<u8>]) -> Result<()> {
        let mut inner = self.inner.write();
        let Inner { table, wal } = &mut *inner;
        let wal = wal.as_mut().ok_or(Error::Closed)?;
        for key in keys {
            wal.append(&WALRecord::delete(key.clone()))?;
            table.delete(key);
        }
        Ok(())
    }

    fn delete_if_unchanged(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<usize> {
        let mut inner = self.inner.write();
        let Inner { table, wal } = &mut *inner;
        let wal = wal.as_mut().ok_or(Error::Closed)?;
        let mut removed = 0;
        for (key, value) in entries {
            if table.peek(key) != Some(value.as_slice()) {
                continue;
            }
            wal.append(&WALRecord::delete(key.clone()))?;
            table.delete(key);
            removed += 1;
        }
        Ok(removed)
    }

    fn purge_expired(&self) -> Result<usize> {
        let mut inner = self.inner.write();
        if inner.wal.is_none() {
            return Err(Error::Closed);
        }
        let purged = inner.table.purge_expired(now_millis());
        self.maybe_rewrite_log(&mut inner)?;
        Ok(purged)
    }

    fn close(&self) -> Result<()> {
        let mut inner = self.inner.write();
        if let Some(mut wal) = inner.wal.take() {
            wal.sync()?;
            info!(dir = %self.dir.display(), "closed store");
        }
        Ok(())
    }
}

/// Smallest key strictly greater than `key`.
fn successor(key: &[u8]) -> Vec<u8> {
    let mut next = Vec::with_capacity(key.len() + 1);
    next.extend_from_slice(key);
    next.push(0x00);
    next
}
