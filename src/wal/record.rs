use crate::error::{Error, Result};

/// Record type stored in the WAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Put = 0x01,
    Delete = 0x02,
}

impl RecordType {
    fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(RecordType::Put),
            0x02 => Ok(RecordType::Delete),
            _ => Err(Error::Corruption(format!("invalid record type: {}", byte))),
        }
    }
}

/// A single record in the WAL.
///
/// On-disk format:
/// ```text
/// ┌──────────┬────────┬──────────┬───────────┬──────────────┬───────────┬──────────┐
/// │ CRC (4B) │ Len(4B)│ Type(1B) │ KeyLen(4B)│ ExpiresAt(8B)│ Key (var) │Val (var) │
/// └──────────┴────────┴──────────┴───────────┴──────────────┴───────────┴──────────┘
/// ```
///
/// CRC covers everything after the CRC field itself. `expires_at` is in Unix
/// millis, 0 for entries that never expire and for deletes.
#[derive(Debug, Clone)]
pub struct WALRecord {
    pub record_type: RecordType,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub expires_at: u64,
}

// Header sizes
const CRC_SIZE: usize = 4;
const LEN_SIZE: usize = 4;
const TYPE_SIZE: usize = 1;
const KEY_LEN_SIZE: usize = 4;
const EXPIRY_SIZE: usize = 8;
const HEADER_SIZE: usize = CRC_SIZE + LEN_SIZE + TYPE_SIZE + KEY_LEN_SIZE + EXPIRY_SIZE;

impl WALRecord {
    /// Create a Put record.
    pub fn put(key: Vec<u8>, value: Vec<u8>, expires_at: u64) -> Self {
        WALRecord {
            record_type: RecordType::Put,
            key,
            value,
            expires_at,
        }
    }

    /// Create a Delete record.
    pub fn delete(key: Vec<u8>) -> Self {
        WALRecord {
            record_type: RecordType::Delete,
            key,
            value: Vec::new(),
            expires_at: 0,
        }
    }

    /// Serialize this record to bytes (including CRC header).
    pub fn encode(&self) -> Vec<u8> {
        let payload_len = TYPE_SIZE + KEY_LEN_SIZE + EXPIRY_SIZE + self.key.len() + self.value.len();
        let mut buf = Vec::with_capacity(CRC_SIZE + LEN_SIZE + payload_len);

        // CRC is filled in last
        buf.extend_from_slice(&[0u8; CRC_SIZE]);
        buf.extend_from_slice(&(payload_len as u32).to_le_bytes());
        buf.push(self.record_type as u8);
        buf.extend_from_slice(&(self.key.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.expires_at.to_le_bytes());
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);

        let crc = crc32fast::hash(&buf[CRC_SIZE..]);
        buf[0..CRC_SIZE].copy_from_slice(&crc.to_le_bytes());

        buf
    }

    /// Parse one record from the front of `data`. Bytes past the record are ignored.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::Corruption("record too short".into()));
        }

        let stored_crc = le_u32(&data[..CRC_SIZE]);
        let payload_len = le_u32(&data[CRC_SIZE..CRC_SIZE + LEN_SIZE]) as usize;
        let total_len = CRC_SIZE + LEN_SIZE + payload_len;
        if total_len < HEADER_SIZE || data.len() < total_len {
            return Err(Error::Corruption("record truncated".into()));
        }

        let body = &data[CRC_SIZE..total_len];
        if crc32fast::hash(body) != stored_crc {
            return Err(Error::Corruption("CRC mismatch".into()));
        }

        // body: len | type | key_len | expires_at | key | value
        let (header, rest) = body[LEN_SIZE..].split_at(TYPE_SIZE + KEY_LEN_SIZE + EXPIRY_SIZE);
        let record_type = RecordType::from_u8(header[0])?;
        let key_len = le_u32(&header[TYPE_SIZE..TYPE_SIZE + KEY_LEN_SIZE]) as usize;
        let expires_at = le_u64(&header[TYPE_SIZE + KEY_LEN_SIZE..]);
        if key_len > rest.len() {
            return Err(Error::Corruption("key length exceeds record".into()));
        }
        let (key, value) = rest.split_at(key_len);

        Ok(WALRecord {
            record_type,
            key: key.to_vec(),
            value: value.to_vec(),
            expires_at,
        })
    }

    /// Size of this record when serialized on disk.
    pub fn encoded_size(&self) -> usize {
        Self::put_size(&self.key, &self.value)
    }

    /// Serialized size of a Put record for `key` and `value`.
    pub fn put_size(key: &[u8], value: &[u8]) -> usize {
        HEADER_SIZE + key.len() + value.len()
    }
}

fn le_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

fn le_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}
