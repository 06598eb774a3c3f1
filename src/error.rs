use std::io;
use std::sync::Arc;

/// Boxed error produced by collaborators (sinks, filters, task processes).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Unified error type for the buffer, its store, encoders and tasks.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error from disk operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Data corruption detected in the store (CRC mismatch, bad format, etc).
    #[error("Corruption: {0}")]
    Corruption(String),
    /// The store (or the buffer owning it) has been closed.
    #[error("Store is closed")]
    Closed,
    /// A stored payload could not be decoded into a block.
    #[error("Decode error: {0}")]
    Decode(String),
    /// The sink rejected a merged batch. Source entries were kept.
    #[error("Sink write failed: {0}")]
    SinkWriteFailed(#[source] BoxError),
    /// Encoder requested under a name that is not registered.
    #[error("Unknown encoding: {0}")]
    UnknownEncoding(String),
    /// The row filter failed to evaluate (as opposed to rejecting the row).
    #[error("Filter evaluation failed: {0}")]
    Filter(#[source] BoxError),
    /// Row serialization failed.
    #[error("Serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
    /// Work was cancelled before it completed.
    #[error("Cancelled")]
    Cancelled,
    /// `run` was called on a task that already left the created state.
    #[error("Task already started")]
    TaskAlreadyStarted,
    /// The task process returned an error.
    #[error("Task failed: {0}")]
    TaskFailed(Arc<dyn std::error::Error + Send + Sync + 'static>),
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
