//! Row blocks: the payload format staged in the buffer and handed to sinks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// One row: column name -> value, iterated in column-name order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    pub values: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column setter.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(column.into(), value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }
}

/// Column type inferred from row values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    Bool,
    Int64,
    Float64,
    String,
    /// Arrays, objects, and columns seen with conflicting types.
    Json,
}

impl ValueType {
    /// Type of a single value. Nulls carry no type.
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(ValueType::Bool),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(ValueType::Int64),
            Value::Number(_) => Some(ValueType::Float64),
            Value::String(_) => Some(ValueType::String),
            Value::Array(_) | Value::Object(_) => Some(ValueType::Json),
        }
    }
}

/// Column name -> type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema(pub BTreeMap<String, ValueType>);

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Infer the schema of a set of rows.
    pub fn infer<'a>(rows: impl IntoIterator<Item = &'a Row>) -> Self {
        let mut schema = Schema::new();
        for row in rows {
            for (column, value) in &row.values {
                if let Some(typ) = ValueType::of(value) {
                    schema.add(column, typ);
                }
            }
        }
        schema
    }

    /// Union with another schema. Conflicting columns widen to `Json`.
    pub fn merge(&mut self, other: &Schema) {
        for (column, typ) in &other.0 {
            self.add(column, *typ);
        }
    }

    fn add(&mut self, column: &str, typ: ValueType) {
        self.0
            .entry(column.to_string())
            .and_modify(|existing| {
                if *existing != typ {
                    *existing = ValueType::Json;
                }
            })
            .or_insert(typ);
    }

    pub fn get(&self, column: &str) -> Option<ValueType> {
        self.0.get(column).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Checksum + length header in front of every encoded block.
const HEADER_SIZE: usize = 8;

/// A decoded batch of rows with its inferred schema.
///
/// Encoded form:
/// ```text
/// ┌──────────┬──────────┬──────────────────────────┐
/// │ CRC (4B) │ Len (4B) │ rows as a JSON array     │
/// └──────────┴──────────┴──────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    rows: Vec<Row>,
    schema: Schema,
}

impl Block {
    pub fn new(rows: Vec<Row>) -> Self {
        let schema = Schema::infer(&rows);
        Block { rows, schema }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Serialize to the checksummed payload format.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = serde_json::to_vec(&self.rows)?;
        let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
        buf.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
        buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
        buf.extend_from_slice(&body);
        Ok(buf)
    }

    /// Parse a payload produced by `encode`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::Decode("block too short".into()));
        }
        let stored_crc = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let len = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
        let body = data
            .get(HEADER_SIZE..HEADER_SIZE + len)
            .ok_or_else(|| Error::Decode("block truncated".into()))?;
        if crc32fast::hash(body) != stored_crc {
            return Err(Error::Decode("block CRC mismatch".into()));
        }
        let rows: Vec<Row> =
            serde_json::from_slice(body).map_err(|e| Error::Decode(format!("block rows: {e}")))?;
        Ok(Block::new(rows))
    }
}
