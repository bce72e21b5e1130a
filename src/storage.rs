//! Storage interfaces.
//!
//! The engine does not own an on-disk format. Scans read through a
//! [`TableSource`] and CREATE TABLE AS writes through a [`TableEncoder`] and
//! [`TableTarget`]; the host supplies implementations for its format. An
//! in-memory implementation backed by JSON encoding is provided for
//! embedding and tests.

use crate::error::{DbError, DbResult};
use crate::tuples::values::FieldValue;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Storage-level column types, inferred from data on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    Float,
    Text,
    Boolean,
}

impl DataType {
    /// Infer the column type from one value. NULL carries no type, so a NULL
    /// in the inference row is an error.
    pub fn infer(value: &FieldValue) -> DbResult<DataType> {
        match value {
            FieldValue::Integer(_) => Ok(DataType::Integer),
            FieldValue::Float(_) => Ok(DataType::Float),
            FieldValue::Text(_) => Ok(DataType::Text),
            FieldValue::Boolean(_) => Ok(DataType::Boolean),
            FieldValue::Null => Err(DbError::execution(
                "Cannot infer a column type from a NULL value",
            )),
        }
    }
}

/// A readable table: ordered columns plus row data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<FieldValue>>,
    /// Bytes touched to produce this read, for scan stats.
    pub bytes_read: u64,
}

/// One scannable relation.
#[async_trait]
pub trait TableSource: Send + Sync {
    /// Ordered column names of the full relation.
    fn columns(&self) -> Vec<String>;

    /// Read the relation, optionally projected down to `columns` (in the
    /// requested order).
    async fn read(&self, columns: Option<&[String]>) -> DbResult<TableData>;
}

/// Encodes a materialized result into the storage format's byte payload.
pub trait TableEncoder: Send + Sync {
    fn encode(
        &self,
        columns: &[(String, DataType)],
        rows: &[Vec<FieldValue>],
    ) -> DbResult<Vec<u8>>;
}

pub enum WriteMode {
    Create,
    Replace,
}

/// A writable table location.
#[async_trait]
pub trait TableTarget: Send + Sync {
    async fn open(&self, mode: WriteMode) -> DbResult<Box<dyn WriteHandle>>;
}

#[async_trait]
pub trait WriteHandle: Send {
    /// Write the encoded payload, returning the byte count written.
    async fn write(&mut self, bytes: &[u8]) -> DbResult<u64>;
}

impl std::fmt::Debug for dyn WriteHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WriteHandle")
    }
}

/// JSON table encoding for the in-memory storage. Columns and rows become
/// one serde_json document.
pub struct JsonTableEncoder;

#[derive(Serialize, Deserialize)]
struct JsonTable {
    columns: Vec<(String, DataType)>,
    rows: Vec<Vec<FieldValue>>,
}

impl TableEncoder for JsonTableEncoder {
    fn encode(
        &self,
        columns: &[(String, DataType)],
        rows: &[Vec<FieldValue>],
    ) -> DbResult<Vec<u8>> {
        let doc = JsonTable {
            columns: columns.to_vec(),
            rows: rows.to_vec(),
        };
        serde_json::to_vec(&doc)
            .map_err(|e| DbError::resource("table", format!("encoding failed: {}", e)))
    }
}

/// In-memory table catalog keyed by relation name.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    tables: Arc<Mutex<HashMap<String, TableData>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_table(&self, name: &str, columns: Vec<String>, rows: Vec<Vec<FieldValue>>) {
        let data = TableData {
            columns,
            rows,
            bytes_read: 0,
        };
        self.lock().insert(name.to_string(), data);
    }

    /// A scan source for `name`. Missing tables surface as resource errors
    /// at read time, not here, so plans can be built before data exists.
    pub fn source(&self, name: &str) -> MemoryTableSource {
        MemoryTableSource {
            storage: self.clone(),
            name: name.to_string(),
        }
    }

    pub fn target(&self, name: &str) -> MemoryTableTarget {
        MemoryTableTarget {
            storage: self.clone(),
            name: name.to_string(),
        }
    }

    pub fn table_rows(&self, name: &str) -> Option<Vec<Vec<FieldValue>>> {
        self.lock().get(name).map(|t| t.rows.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, TableData>> {
        self.tables.lock().expect("storage lock poisoned")
    }
}

pub struct MemoryTableSource {
    storage: MemoryStorage,
    name: String,
}

#[async_trait]
impl TableSource for MemoryTableSource {
    fn columns(&self) -> Vec<String> {
        self.storage
            .lock()
            .get(&self.name)
            .map(|t| t.columns.clone())
            .unwrap_or_default()
    }

    async fn read(&self, columns: Option<&[String]>) -> DbResult<TableData> {
        let tables = self.storage.lock();
        let table = tables.get(&self.name).ok_or_else(|| {
            DbError::resource(&self.name, "table does not exist")
        })?;

        let keep: Vec<usize> = match columns {
            None => (0..table.columns.len()).collect(),
            Some(wanted) => wanted
                .iter()
                .map(|name| {
                    table
                        .columns
                        .iter()
                        .position(|c| c == name)
                        .ok_or_else(|| DbError::UnknownField { name: name.clone() })
                })
                .collect::<DbResult<_>>()?,
        };

        let columns: Vec<String> = keep.iter().map(|&i| table.columns[i].clone()).collect();
        let rows: Vec<Vec<FieldValue>> = table
            .rows
            .iter()
            .map(|row| keep.iter().map(|&i| row[i].clone()).collect())
            .collect();

        // Approximate the read cost from the projected payload.
        let bytes_read = rows
            .iter()
            .flatten()
            .map(|v| v.to_display_string().len() as u64)
            .sum();

        Ok(TableData {
            columns,
            rows,
            bytes_read,
        })
    }
}

pub struct MemoryTableTarget {
    storage: MemoryStorage,
    name: String,
}

#[async_trait]
impl TableTarget for MemoryTableTarget {
    async fn open(&self, mode: WriteMode) -> DbResult<Box<dyn WriteHandle>> {
        if matches!(mode, WriteMode::Create) && self.storage.lock().contains_key(&self.name) {
            return Err(DbError::resource(&self.name, "table already exists"));
        }
        Ok(Box::new(MemoryWriteHandle {
            storage: self.storage.clone(),
            name: self.name.clone(),
        }))
    }
}

struct MemoryWriteHandle {
    storage: MemoryStorage,
    name: String,
}

#[async_trait]
impl WriteHandle for MemoryWriteHandle {
    async fn write(&mut self, bytes: &[u8]) -> DbResult<u64> {
        let doc: JsonTable = serde_json::from_slice(bytes)
            .map_err(|e| DbError::resource(&self.name, format!("decoding failed: {}", e)))?;
        let data = TableData {
            columns: doc.columns.into_iter().map(|(name, _)| name).collect(),
            rows: doc.rows,
            bytes_read: 0,
        };
        self.storage.lock().insert(self.name.clone(), data);
        Ok(bytes.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> MemoryStorage {
        let storage = MemoryStorage::new();
        storage.put_table(
            "events",
            vec!["id".to_string(), "kind".to_string()],
            vec![
                vec![FieldValue::Integer(1), FieldValue::Text("click".into())],
                vec![FieldValue::Integer(2), FieldValue::Text("view".into())],
            ],
        );
        storage
    }

    #[tokio::test]
    async fn test_read_with_projection() {
        let storage = seeded();
        let source = storage.source("events");
        let wanted = vec!["kind".to_string()];
        let data = source.read(Some(&wanted)).await.unwrap();
        assert_eq!(data.columns, vec!["kind".to_string()]);
        assert_eq!(data.rows[1], vec![FieldValue::Text("view".into())]);
        assert!(data.bytes_read > 0);
    }

    #[tokio::test]
    async fn test_read_missing_table() {
        let storage = MemoryStorage::new();
        let err = storage.source("ghost").read(None).await.unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[tokio::test]
    async fn test_encode_write_read_back() {
        let storage = MemoryStorage::new();
        let columns = vec![("n".to_string(), DataType::Integer)];
        let rows = vec![vec![FieldValue::Integer(7)]];
        let bytes = JsonTableEncoder.encode(&columns, &rows).unwrap();

        let mut handle = storage.target("out").open(WriteMode::Create).await.unwrap();
        handle.write(&bytes).await.unwrap();

        assert_eq!(storage.table_rows("out").unwrap(), rows);
        let err = storage.target("out").open(WriteMode::Create).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_infer_rejects_null() {
        assert_eq!(
            DataType::infer(&FieldValue::Float(1.5)).unwrap(),
            DataType::Float
        );
        assert!(DataType::infer(&FieldValue::Null).is_err());
    }
}
