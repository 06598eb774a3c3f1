use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;
use crate::wal::SyncPolicy;
use crate::wal::record::WALRecord;

/// Appends WAL records to a file on disk.
///
/// Two layers of buffering:
///   BufWriter.flush()  → Rust buffer → OS page cache
///   file.sync_all()    → OS page cache → physical disk
///
/// Every append reaches the page cache before it returns; the sync policy
/// decides how often it also reaches the disk.
pub struct WALWriter {
    writer: BufWriter<File>,
    offset: u64,
    sync_policy: SyncPolicy,
    writes_since_sync: usize,
}

impl WALWriter {
    /// Open (or create) the WAL at `path` and append after existing records.
    pub fn new(path: &Path, sync_policy: SyncPolicy) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let offset = file.metadata()?.len();
        Ok(Self::from_file(file, offset, sync_policy))
    }

    /// Create an empty WAL at `path`, truncating whatever was there.
    pub fn create(path: &Path, sync_policy: SyncPolicy) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::from_file(file, 0, sync_policy))
    }

    fn from_file(file: File, offset: u64, sync_policy: SyncPolicy) -> Self {
        WALWriter {
            writer: BufWriter::new(file),
            offset,
            sync_policy,
            writes_since_sync: 0,
        }
    }

    /// Append a record to the WAL.
    /// Depending on SyncPolicy, may fsync after this write.
    pub fn append(&mut self, record: &WALRecord) -> Result<()> {
        let encoded = record.encode();

        self.writer.write_all(&encoded)?;
        self.writer.flush()?;
        self.offset += encoded.len() as u64;
        self.writes_since_sync += 1;

        let due = match self.sync_policy {
            SyncPolicy::EveryWrite => true,
            SyncPolicy::EveryNWrites(n) => self.writes_since_sync >= n,
        };
        if due {
            self.writer.get_ref().sync_all()?;
            self.writes_since_sync = 0;
        }

        Ok(())
    }

    /// Force fsync to disk. Ensures all buffered writes are durable.
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.writes_since_sync = 0;
        Ok(())
    }

    /// Current file offset (bytes written so far).
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Appends not yet covered by an fsync.
    pub fn writes_since_sync(&self) -> usize {
        self.writes_since_sync
    }
}
