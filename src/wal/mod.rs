pub mod reader;
pub mod record;
pub mod writer;

pub use record::{RecordType, WALRecord};

/// Controls when the WAL is fsync'd to disk.
///
/// Trade-off: durability vs throughput.
///   - EveryWrite: no acknowledged append is lost, each append waits for the disk
///   - EveryNWrites: batched durability, lose up to N appends on crash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
    /// fsync after every record. Safest, slowest.
    EveryWrite,
    /// fsync every N records. Batched durability.
    EveryNWrites(usize),
}
