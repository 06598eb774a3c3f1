use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

/// Raw key bytes.
pub type Key = Vec<u8>;

/// Raw value bytes.
pub type Value = Vec<u8>;

/// Escape byte for a 0x00 inside the partition.
const ESCAPE: u8 = 0xFF;
/// Second byte of the partition terminator (`0x00 0x01`).
const TERMINATOR: u8 = 0x01;
/// Size of the encoded timestamp suffix.
const TIMESTAMP_SIZE: usize = 8;

/// Buffer key: partition first, timestamp second.
///
/// Ordering: (partition ASC, timestamp ASC), and the encoded bytes compare
/// byte-wise in exactly the same order, so an ordered byte store keeps every
/// partition in one contiguous, time-sorted run.
///
/// ```text
/// ┌──────────────────────────────────────┬───────────┬──────────────────────┐
/// │ partition (0x00 escaped as 0x00 0xFF)│ 0x00 0x01 │ timestamp (8B BE)    │
/// └──────────────────────────────────────┴───────────┴──────────────────────┘
/// ```
///
/// The timestamp is the signed nanosecond offset from the Unix epoch with the
/// sign bit flipped, so pre-epoch instants sort before post-epoch ones.
/// Instants beyond the i64 nanosecond range (about 292 years either side of
/// the epoch) saturate: they encode identically and compare equal.
#[derive(Debug, Clone)]
pub struct CompositeKey {
    pub partition: String,
    pub timestamp: SystemTime,
}

impl CompositeKey {
    pub fn new(partition: impl Into<String>, timestamp: SystemTime) -> Self {
        CompositeKey {
            partition: partition.into(),
            timestamp,
        }
    }

    /// Lower bound of every encoded key.
    pub fn first() -> Key {
        Vec::new()
    }

    /// Upper bound of every encoded key. UTF-8 never produces 0xFF, so no
    /// partition can start with it.
    pub fn last() -> Key {
        vec![0xFF]
    }

    /// Serialize to the order-preserving byte form.
    pub fn encode(&self) -> Key {
        let partition = self.partition.as_bytes();
        let mut buf = Vec::with_capacity(partition.len() + 2 + TIMESTAMP_SIZE);
        for &b in partition {
            buf.push(b);
            if b == 0x00 {
                buf.push(ESCAPE);
            }
        }
        buf.push(0x00);
        buf.push(TERMINATOR);
        buf.extend_from_slice(&encode_timestamp(self.timestamp));
        buf
    }

    /// Parse an encoded key back into its parts.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let prefix = Self::partition_of(data);
        if data.len() != prefix.len() + TIMESTAMP_SIZE || !prefix.ends_with(&[0x00, TERMINATOR]) {
            return Err(Error::Corruption("malformed composite key".into()));
        }

        let mut partition = Vec::with_capacity(prefix.len());
        let mut i = 0;
        while i < prefix.len() - 2 {
            let b = prefix[i];
            partition.push(b);
            if b == 0x00 {
                if prefix.get(i + 1) != Some(&ESCAPE) {
                    return Err(Error::Corruption("unescaped null in partition".into()));
                }
                i += 1;
            }
            i += 1;
        }
        let partition = String::from_utf8(partition)
            .map_err(|e| Error::Corruption(format!("partition is not utf-8: {e}")))?;

        let mut ts = [0u8; TIMESTAMP_SIZE];
        ts.copy_from_slice(&data[prefix.len()..]);
        Ok(CompositeKey {
            partition,
            timestamp: decode_timestamp(ts),
        })
    }

    /// The encoded partition portion of a key (terminator included).
    ///
    /// Two keys belong to the same partition iff their prefixes are equal.
    /// Inputs shorter than a timestamp yield an empty prefix.
    pub fn partition_of(data: &[u8]) -> &[u8] {
        &data[..data.len().saturating_sub(TIMESTAMP_SIZE)]
    }
}

impl Ord for CompositeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.partition
            .as_bytes()
            .cmp(other.partition.as_bytes())
            .then_with(|| timestamp_nanos(self.timestamp).cmp(&timestamp_nanos(other.timestamp)))
    }
}

impl PartialEq for CompositeKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CompositeKey {}

impl Hash for CompositeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.partition.hash(state);
        timestamp_nanos(self.timestamp).hash(state);
    }
}

impl PartialOrd for CompositeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Signed nanoseconds since the epoch, saturating at the i64 range.
fn timestamp_nanos(ts: SystemTime) -> i64 {
    match ts.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_nanos()).unwrap_or(i64::MAX),
        Err(before) => i64::try_from(before.duration().as_nanos())
            .map(|n| -n)
            .unwrap_or(i64::MIN),
    }
}

fn encode_timestamp(ts: SystemTime) -> [u8; TIMESTAMP_SIZE] {
    ((timestamp_nanos(ts) as u64) ^ (1 << 63)).to_be_bytes()
}

fn decode_timestamp(bytes: [u8; TIMESTAMP_SIZE]) -> SystemTime {
    let nanos = (u64::from_be_bytes(bytes) ^ (1 << 63)) as i64;
    if nanos >= 0 {
        UNIX_EPOCH + Duration::from_nanos(nanos as u64)
    } else {
        UNIX_EPOCH - Duration::from_nanos(nanos.unsigned_abs())
    }
}
