//! # stagebuf
//!
//! A write buffer for partitioned event data.
//!
//! ## Core idea
//! Producers append small encoded row blocks keyed by (partition, timestamp).
//! The buffer keeps them in an ordered, TTL-bounded store where every
//! partition forms one contiguous, time-sorted run. A compaction pass, run on
//! a timer or on demand, walks the store in key order and hands each run to a
//! sink as a single batch, deleting the run once the sink accepts it.

pub mod block;
pub mod compact;
pub mod encoder;
pub mod error;
pub mod iterator;
pub mod memtable;
pub mod store;
pub mod task;
pub mod types;
pub mod wal;
pub mod writer;

// Public re-exports for the top-level API
pub use block::{Block, Row, Schema, ValueType};
pub use compact::{CompactStats, CompactingBuffer, Options, Sink};
pub use encoder::{Filter, RowEncoder};
pub use error::{BoxError, Error, Result};
pub use store::{DiskStore, OrderedStore, StoreConfig};
pub use task::{Task, TaskState};
pub use tokio_util::sync::CancellationToken;
pub use types::CompositeKey;
pub use writer::{FileWriter, Writer};
