//! Row encoding with an optional filter, applied before rows leave a sink.

use std::fmt;
use std::sync::Arc;

use crate::block::Row;
use crate::error::{BoxError, Error, Result};

/// Decides whether a row should be delivered.
///
/// A filter error is not the same as rejecting the row: `RowEncoder::encode`
/// reports it as `Error::Filter`.
pub trait Filter: Send + Sync {
    fn evaluate(&self, row: &Row) -> std::result::Result<bool, BoxError>;
}

impl<F> Filter for F
where
    F: Fn(&Row) -> std::result::Result<bool, BoxError> + Send + Sync,
{
    fn evaluate(&self, row: &Row) -> std::result::Result<bool, BoxError> {
        self(row)
    }
}

/// Wrap a closure as a shareable filter.
pub fn filter<F>(f: F) -> Arc<dyn Filter>
where
    F: Fn(&Row) -> std::result::Result<bool, BoxError> + Send + Sync + 'static,
{
    Arc::new(f)
}

type EncodeFn = fn(&Row) -> Result<Vec<u8>>;

/// Supported encodings, looked up by name.
const ENCODINGS: &[(&str, EncodeFn)] = &[("json", encode_json)];

/// Compact JSON object with keys in alphabetical order.
fn encode_json(row: &Row) -> Result<Vec<u8>> {
    // BTreeMap iteration order makes the output deterministic
    Ok(serde_json::to_vec(&row.values)?)
}

/// Names of every registered encoding.
pub fn encodings() -> impl Iterator<Item = &'static str> {
    ENCODINGS.iter().map(|(name, _)| *name)
}

/// Serializes rows under a named encoding, dropping rows the filter rejects.
#[derive(Clone)]
pub struct RowEncoder {
    name: &'static str,
    encode: EncodeFn,
    filter: Option<Arc<dyn Filter>>,
}

impl fmt::Debug for RowEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowEncoder")
            .field("encoding", &self.name)
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

impl RowEncoder {
    /// Resolve `encoding` against the registry. Without a filter every row
    /// is encoded.
    pub fn new(encoding: &str, filter: Option<Arc<dyn Filter>>) -> Result<Self> {
        let (name, encode) = ENCODINGS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(encoding))
            .copied()
            .ok_or_else(|| Error::UnknownEncoding(encoding.to_string()))?;
        Ok(RowEncoder {
            name,
            encode,
            filter,
        })
    }

    /// Encode a row. Returns `Ok(None)` when the filter rejects it.
    pub fn encode(&self, row: &Row) -> Result<Option<Vec<u8>>> {
        if let Some(filter) = &self.filter {
            if !filter.evaluate(row).map_err(Error::Filter)? {
                return Ok(None);
            }
        }
        (self.encode)(row).map(Some)
    }

    /// Name of the resolved encoding.
    pub fn encoding(&self) -> &'static str {
        self.name
    }
}
