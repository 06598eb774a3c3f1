//! Shared plumbing for sinks: row encoding plus one background task.

pub mod file;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

pub use file::FileWriter;

use crate::block::Row;
use crate::encoder::{Filter, RowEncoder};
use crate::error::{BoxError, Error, Result};
use crate::task::{Task, TaskState};

/// Base of a concrete sink.
///
/// Encodes rows under the configured encoding (dropping filtered rows), and
/// optionally owns a long-running delivery process started with `run` and
/// stopped with `close`.
pub struct Writer {
    encoder: RowEncoder,
    task: Mutex<Option<Arc<Task<()>>>>,
}

impl Writer {
    /// Fails with `Error::UnknownEncoding` if `encoding` is not registered.
    pub fn new(encoding: &str, filter: Option<Arc<dyn Filter>>) -> Result<Self> {
        Ok(Writer {
            encoder: RowEncoder::new(encoding, filter)?,
            task: Mutex::new(None),
        })
    }

    /// Encode a row; `Ok(None)` means the filter dropped it.
    pub fn encode(&self, row: &Row) -> Result<Option<Vec<u8>>> {
        self.encoder.encode(row)
    }

    pub fn encoder(&self) -> &RowEncoder {
        &self.encoder
    }

    /// Start `process` in the background under a child of `parent`.
    /// A writer runs at most one process.
    pub fn run<F>(&self, parent: &CancellationToken, process: F) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> std::result::Result<(), BoxError> + Send + 'static,
    {
        let mut slot = self.task.lock();
        if slot.is_some() {
            return Err(Error::TaskAlreadyStarted);
        }
        let task = Arc::new(Task::new(process));
        task.run(parent)?;
        *slot = Some(task);
        Ok(())
    }

    /// Cancel the background process, if any. Does not wait for it.
    pub fn close(&self) {
        if let Some(task) = self.task.lock().as_ref() {
            task.close();
        }
    }

    /// The background process, once `run` has been called.
    pub fn task(&self) -> Option<Arc<Task<()>>> {
        self.task.lock().clone()
    }

    pub fn state(&self) -> Option<TaskState> {
        self.task.lock().as_ref().map(|task| task.state())
    }
}
