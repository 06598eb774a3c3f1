use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::wal::record::WALRecord;

/// Reads WAL records from a file for replay on open.
///
/// Loads the entire file into memory, then iterates record by record.
/// If CRC fails on a record, iteration stops: it was a partial write from a
/// crash, and all preceding records are valid.
pub struct WALReader {
    data: Vec<u8>,
}

impl WALReader {
    /// Open a WAL file for reading.
    pub fn new(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        Ok(WALReader { data })
    }

    /// Create an iterator over all valid records in the WAL.
    pub fn iter(&self) -> WALIterator<'_> {
        WALIterator {
            data: &self.data,
            offset: 0,
        }
    }

    /// Bytes after the last valid record (a torn tail, if non-zero).
    pub fn trailing_bytes(&self) -> usize {
        let mut iter = self.iter();
        while iter.next().is_some() {}
        self.data.len() - iter.offset
    }
}

/// Iterator over WAL records. Yields records until EOF or corruption.
pub struct WALIterator<'a> {
    data: &'a [u8],
    offset: usize,
}

impl Iterator for WALIterator<'_> {
    type Item = WALRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.data.len() {
            return None;
        }

        match WALRecord::decode(&self.data[self.offset..]) {
            Ok(record) => {
                self.offset += record.encoded_size();
                Some(record)
            }
            Err(_) => None,
        }
    }
}
