use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::block::{Block, Schema};
use crate::compact::Sink;
use crate::encoder::Filter;
use crate::error::Result;
use crate::writer::Writer;

/// Sink that writes every merged batch to its own file.
///
/// Rows are encoded one per line. Each batch is written to a temporary file
/// and renamed into place, so a failed write leaves nothing behind and the
/// buffer's retry produces a complete file.
pub struct FileWriter {
    base: Writer,
    dir: PathBuf,
    seq: AtomicU64,
}

impl FileWriter {
    pub fn new(
        dir: impl AsRef<Path>,
        encoding: &str,
        filter: Option<Arc<dyn Filter>>,
    ) -> Result<Self> {
        let base = Writer::new(encoding, filter)?;
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let seq = next_sequence(&dir, base.encoder().encoding())?;
        Ok(FileWriter {
            base,
            dir,
            seq: AtomicU64::new(seq),
        })
    }

    pub fn writer(&self) -> &Writer {
        &self.base
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Sink for FileWriter {
    fn write_block(&self, blocks: Vec<Block>, schema: &Schema) -> Result<()> {
        let mut out = Vec::new();
        let mut rows = 0usize;
        for block in &blocks {
            for row in block.rows() {
                if let Some(encoded) = self.base.encode(row)? {
                    out.extend_from_slice(&encoded);
                    out.push(b'\n');
                    rows += 1;
                }
            }
        }
        if rows == 0 {
            return Ok(());
        }

        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let name = format!("{:010}.{}", seq, self.base.encoder().encoding());
        let path = self.dir.join(&name);
        let tmp = self.dir.join(format!("{name}.tmp"));

        if let Err(err) = write_then_rename(&tmp, &path, &out) {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!(file = %tmp.display(), error = %cleanup, "could not remove temp file");
                }
            }
            return Err(err.into());
        }

        debug!(file = %path.display(), rows, columns = schema.len(), "wrote batch");
        Ok(())
    }
}

fn write_then_rename(tmp: &Path, path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(tmp)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);
    fs::rename(tmp, path)
}

/// One past the highest sequence number already present in `dir`.
fn next_sequence(dir: &Path, extension: &str) -> Result<u64> {
    let mut next = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        if let Some(seq) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u64>().ok())
        {
            next = next.max(seq + 1);
        }
    }
    Ok(next)
}
