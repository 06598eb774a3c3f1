//! The compacting buffer: stages encoded blocks under composite keys and
//! merges each partition's run into one sink write.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::block::{Block, Schema};
use crate::error::{Error, Result};
use crate::store::OrderedStore;
use crate::types::{CompositeKey, Key, Value};

const DEFAULT_COMPACT_INTERVAL: Duration = Duration::from_secs(30);

/// Receives one partition's merged blocks per call, in key order.
///
/// Returning an error keeps the source entries in the buffer; the next pass
/// delivers them again. Delivery is therefore at-least-once and a sink must
/// tolerate seeing the same blocks twice.
pub trait Sink: Send + Sync {
    fn write_block(&self, blocks: Vec<Block>, schema: &Schema) -> Result<()>;
}

impl<F> Sink for F
where
    F: Fn(Vec<Block>, &Schema) -> Result<()> + Send + Sync,
{
    fn write_block(&self, blocks: Vec<Block>, schema: &Schema) -> Result<()> {
        self(blocks, schema)
    }
}

/// Wrap a closure as a shareable sink.
pub fn sink<F>(f: F) -> Arc<dyn Sink>
where
    F: Fn(Vec<Block>, &Schema) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Clone, Debug)]
pub struct Options {
    /// Period of the background compaction loop. `None` disables it.
    pub compact_interval: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            compact_interval: Some(DEFAULT_COMPACT_INTERVAL),
        }
    }
}

/// What a single compaction pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompactStats {
    /// Groups accepted by the sink (and deleted from the store).
    pub groups_flushed: usize,
    /// Entries covered by those groups.
    pub entries_flushed: usize,
    /// Groups the sink rejected; their entries were kept.
    pub groups_failed: usize,
    /// Undecodable entries left in place.
    pub entries_skipped: usize,
    /// Expired entries reclaimed after the scan.
    pub entries_expired: usize,
}

/// Blocks of one contiguous partition run, accumulated during a scan.
#[derive(Default)]
struct PendingGroup {
    /// Encoded partition prefix shared by every key in the group.
    partition: Vec<u8>,
    /// Readable partition name, for logs.
    name: String,
    /// Source entries as read, so deletion can skip overwritten keys.
    entries: Vec<(Key, Value)>,
    blocks: Vec<Block>,
    schema: Schema,
}

impl PendingGroup {
    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, key: &[u8], value: &[u8], block: Block) {
        if self.is_empty() {
            self.partition = CompositeKey::partition_of(key).to_vec();
            self.name = CompositeKey::decode(key)
                .map(|k| k.partition)
                .unwrap_or_else(|_| String::from_utf8_lossy(&self.partition).into_owned());
        }
        self.schema.merge(block.schema());
        self.entries.push((key.to_vec(), value.to_vec()));
        self.blocks.push(block);
    }
}

struct Inner {
    store: Arc<dyn OrderedStore>,
    sink: Arc<dyn Sink>,
    /// Single-flight guard shared by manual and timer-driven passes.
    flight: Mutex<()>,
    closed: AtomicBool,
    /// Parent of every pass's token; cancelled on close.
    root: CancellationToken,
}

enum WorkerMsg {
    Shutdown,
}

/// A time-bounded staging area that periodically flushes per-partition
/// batches to a sink.
///
/// Entries are keyed by `CompositeKey`, so a full scan sees each partition as
/// one contiguous, time-ordered run. A compaction pass hands every run to the
/// sink in a single `write_block` call and deletes the run's entries once the
/// sink accepts it.
pub struct CompactingBuffer {
    inner: Arc<Inner>,
    worker_tx: Sender<WorkerMsg>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CompactingBuffer {
    /// Wrap `store`, and start the compaction loop if an interval is set.
    pub fn new(store: Arc<dyn OrderedStore>, sink: Arc<dyn Sink>, options: Options) -> Result<Self> {
        let inner = Arc::new(Inner {
            store,
            sink,
            flight: Mutex::new(()),
            closed: AtomicBool::new(false),
            root: CancellationToken::new(),
        });

        let (worker_tx, worker_rx) = crossbeam_channel::bounded(1);
        let worker = match options.compact_interval {
            Some(interval) => Some(spawn_worker(Arc::clone(&inner), interval, worker_rx)?),
            None => None,
        };

        Ok(CompactingBuffer {
            inner,
            worker_tx,
            worker: Mutex::new(worker),
        })
    }

    /// Stage `payload` under `key` for `ttl`. Never merges.
    pub fn append(&self, key: &CompositeKey, payload: &[u8], ttl: Duration) -> Result<()> {
        self.inner.store.append(&key.encode(), payload, ttl)
    }

    /// Visit entries with `from <= key <= to` in ascending key order.
    /// `visit` returns true to stop early.
    pub fn range<F>(&self, from: &[u8], to: &[u8], mut visit: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        self.inner.store.range(from, to, &mut visit)
    }

    /// Run one compaction pass now.
    ///
    /// Waits for an in-flight pass (manual or timer-driven) to finish first.
    /// If `cancel` fires mid-scan the pass stops at the next entry: groups
    /// already flushed stay flushed, the open group is left in the store, and
    /// `Error::Cancelled` is returned.
    pub fn compact(&self, cancel: &CancellationToken) -> Result<CompactStats> {
        self.inner.compact(cancel)
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn OrderedStore> {
        &self.inner.store
    }

    /// Stop the compaction loop, wait out any in-flight pass and close the
    /// store. Later compactions fail with `Error::Closed`.
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.root.cancel();
        self.stop_worker();
        // Drain a manual pass that may still hold the guard
        drop(self.inner.flight.lock());
        info!("compacting buffer closed");
        self.inner.store.close()
    }

    fn stop_worker(&self) {
        if let Some(worker) = self.worker.lock().take() {
            let _ = self.worker_tx.send(WorkerMsg::Shutdown);
            if worker.join().is_err() {
                error!("compaction worker panicked");
            }
        }
    }
}

impl Drop for CompactingBuffer {
    fn drop(&mut self) {
        self.inner.root.cancel();
        self.stop_worker();
    }
}

fn spawn_worker(
    inner: Arc<Inner>,
    interval: Duration,
    rx: Receiver<WorkerMsg>,
) -> Result<JoinHandle<()>> {
    let handle = std::thread::Builder::new()
        .name("stagebuf-compactor".into())
        .spawn(move || {
            let ticker = crossbeam_channel::tick(interval);
            loop {
                crossbeam_channel::select! {
                    recv(ticker) -> _ => {
                        let token = inner.root.child_token();
                        match inner.compact(&token) {
                            Ok(stats) => debug!(?stats, "scheduled compaction finished"),
                            Err(Error::Cancelled | Error::Closed) => {}
                            Err(err) => error!(error = %err, "scheduled compaction failed"),
                        }
                    }
                    recv(rx) -> _ => return,
                }
            }
        })?;
    Ok(handle)
}

impl Inner {
    fn compact(&self, cancel: &CancellationToken) -> Result<CompactStats> {
        let _flight = self.flight.lock();
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        let cancelled = || cancel.is_cancelled() || self.root.is_cancelled();

        let mut stats = CompactStats::default();
        let mut group = PendingGroup::default();
        let mut sink_failure = None;
        let mut abort = None;

        self.store.range(&CompositeKey::first(), &CompositeKey::last(), &mut |key, value| {
            if cancelled() {
                abort = Some(Error::Cancelled);
                return true;
            }

            let block = match Block::decode(value) {
                Ok(block) => block,
                Err(err) => {
                    warn!(key = ?key, error = %err, "skipping undecodable entry");
                    stats.entries_skipped += 1;
                    return false;
                }
            };

            if !group.is_empty() && group.partition != CompositeKey::partition_of(key) {
                let full = std::mem::take(&mut group);
                if let Err(err) = self.flush(full, &mut stats, &mut sink_failure) {
                    abort = Some(err);
                    return true;
                }
            }
            group.push(key, value, block);
            false
        })?;

        if let Some(err) = abort {
            return Err(err);
        }
        if cancelled() {
            return Err(Error::Cancelled);
        }
        if !group.is_empty() {
            self.flush(group, &mut stats, &mut sink_failure)?;
        }

        stats.entries_expired = self.store.purge_expired()?;
        debug!(?stats, "compaction pass finished");

        match sink_failure {
            Some(err) => Err(err),
            None => Ok(stats),
        }
    }

    /// Hand a group to the sink and delete its entries if the sink accepts it.
    /// Entries overwritten while the sink ran are kept for the next pass.
    /// A sink failure is recorded, not returned; store errors are returned.
    fn flush(
        &self,
        group: PendingGroup,
        stats: &mut CompactStats,
        sink_failure: &mut Option<Error>,
    ) -> Result<()> {
        let PendingGroup {
            name,
            entries,
            blocks,
            schema,
            ..
        } = group;

        match self.sink.write_block(blocks, &schema) {
            Ok(()) => {
                let removed = self.store.delete_if_unchanged(&entries)?;
                if removed < entries.len() {
                    debug!(partition = %name, kept = entries.len() - removed, "entries overwritten during flush");
                }
                stats.groups_flushed += 1;
                stats.entries_flushed += entries.len();
                debug!(partition = %name, entries = entries.len(), "flushed group");
            }
            Err(err) => {
                warn!(partition = %name, entries = entries.len(), error = %err, "sink rejected group, keeping entries");
                stats.groups_failed += 1;
                sink_failure.get_or_insert(Error::SinkWriteFailed(Box::new(err)));
            }
        }
        Ok(())
    }
}
