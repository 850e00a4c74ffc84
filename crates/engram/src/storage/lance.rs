use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    Array, ArrayRef, BinaryArray, Float64Array, RecordBatch, RecordBatchIterator, StringArray,
    TimestampMicrosecondArray,
};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::TryStreamExt;
use lancedb::Table;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase, Select};

use crate::error::{MemoryError, Result};
use crate::storage::{Collection, FieldValue, Record, RecordStore};

/// Arrow representation of a record field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Text,
    Float,
    Timestamp,
    /// JSON document stored as UTF-8 text
    Json,
    Blob,
}

impl ColumnKind {
    fn data_type(self) -> DataType {
        match self {
            ColumnKind::Text | ColumnKind::Json => DataType::Utf8,
            ColumnKind::Float => DataType::Float64,
            ColumnKind::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            ColumnKind::Blob => DataType::Binary,
        }
    }
}

const MEMORY_COLUMNS: &[(&str, ColumnKind)] = &[
    ("content", ColumnKind::Text),
    ("memory_type", ColumnKind::Text),
    ("importance", ColumnKind::Float),
    ("timestamp", ColumnKind::Timestamp),
    ("metadata", ColumnKind::Json),
    ("embedding", ColumnKind::Blob),
    ("tags", ColumnKind::Json),
];

const NODE_COLUMNS: &[(&str, ColumnKind)] = &[
    ("content", ColumnKind::Text),
    ("node_type", ColumnKind::Text),
    ("properties", ColumnKind::Json),
    ("connections", ColumnKind::Json),
    ("strength", ColumnKind::Float),
];

fn columns(collection: Collection) -> &'static [(&'static str, ColumnKind)] {
    match collection {
        Collection::Memories => MEMORY_COLUMNS,
        Collection::KnowledgeGraph => NODE_COLUMNS,
    }
}

fn schema(collection: Collection) -> Arc<Schema> {
    let mut fields = vec![Field::new("id", DataType::Utf8, false)];
    fields.extend(
        columns(collection)
            .iter()
            .map(|(name, kind)| Field::new(*name, kind.data_type(), true)),
    );
    Arc::new(Schema::new(fields))
}

fn id_filter(id: &str) -> String {
    format!("id = '{}'", id.replace('\'', "''"))
}

fn wrong_kind(field: &str, kind: ColumnKind, found: &FieldValue) -> MemoryError {
    MemoryError::Storage(format!(
        "Field '{field}' expects {kind:?}, got {}",
        found.kind()
    ))
}

/// Convert records into a single Arrow batch for `collection`
fn records_to_batch(collection: Collection, rows: &[(&str, &Record)]) -> Result<RecordBatch> {
    let layout = columns(collection);

    for (id, record) in rows {
        if let Some(unknown) = record
            .keys()
            .find(|key| !layout.iter().any(|(name, _)| *name == key.as_str()))
        {
            return Err(MemoryError::Storage(format!(
                "Record {id} has field '{unknown}' not stored in {collection}"
            )));
        }
    }

    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(layout.len() + 1);
    let ids: Vec<&str> = rows.iter().map(|(id, _)| *id).collect();
    arrays.push(Arc::new(StringArray::from(ids)));

    for (name, kind) in layout {
        let values = rows.iter().map(|(_, record)| record.get(*name));
        let array: ArrayRef = match kind {
            ColumnKind::Text => {
                let texts = values
                    .map(|value| match value {
                        None => Ok(None),
                        Some(FieldValue::Text(s)) => Ok(Some(s.as_str())),
                        Some(other) => Err(wrong_kind(name, *kind, other)),
                    })
                    .collect::<Result<Vec<Option<&str>>>>()?;
                Arc::new(StringArray::from(texts))
            }
            ColumnKind::Json => {
                let docs = values
                    .map(|value| match value {
                        None => Ok(None),
                        Some(FieldValue::Json(v)) => Ok(Some(serde_json::to_string(v)?)),
                        Some(other) => Err(wrong_kind(name, *kind, other)),
                    })
                    .collect::<Result<Vec<Option<String>>>>()?;
                Arc::new(StringArray::from(docs))
            }
            ColumnKind::Float => {
                let floats = values
                    .map(|value| match value {
                        None => Ok(None),
                        Some(FieldValue::Float(v)) => Ok(Some(*v)),
                        Some(other) => Err(wrong_kind(name, *kind, other)),
                    })
                    .collect::<Result<Vec<Option<f64>>>>()?;
                Arc::new(Float64Array::from(floats))
            }
            ColumnKind::Timestamp => {
                let micros = values
                    .map(|value| match value {
                        None => Ok(None),
                        Some(FieldValue::Timestamp(t)) => Ok(Some(t.timestamp_micros())),
                        Some(other) => Err(wrong_kind(name, *kind, other)),
                    })
                    .collect::<Result<Vec<Option<i64>>>>()?;
                Arc::new(TimestampMicrosecondArray::from(micros).with_timezone("UTC"))
            }
            ColumnKind::Blob => {
                let blobs = values
                    .map(|value| match value {
                        None => Ok(None),
                        Some(FieldValue::Blob(b)) => Ok(Some(b.as_slice())),
                        Some(other) => Err(wrong_kind(name, *kind, other)),
                    })
                    .collect::<Result<Vec<Option<&[u8]>>>>()?;
                Arc::new(BinaryArray::from_opt_vec(blobs))
            }
        };
        arrays.push(array);
    }

    RecordBatch::try_new(schema(collection), arrays)
        .map_err(|e| MemoryError::Storage(format!("Failed to create RecordBatch: {e}")))
}

/// Typed view of one batch column
enum ColumnReader<'a> {
    Text(&'a StringArray),
    Json(&'a StringArray),
    Float(&'a Float64Array),
    Timestamp(&'a TimestampMicrosecondArray),
    Blob(&'a BinaryArray),
}

fn downcast<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|column| column.as_any().downcast_ref::<T>())
        .ok_or_else(|| MemoryError::Storage(format!("Failed to get {name} column")))
}

/// Convert every row of a batch back into `(id, record)` pairs
fn batch_to_records(collection: Collection, batch: &RecordBatch) -> Result<Vec<(String, Record)>> {
    let ids = downcast::<StringArray>(batch, "id")?;

    let mut readers = Vec::new();
    for (name, kind) in columns(collection) {
        let reader = match kind {
            ColumnKind::Text => ColumnReader::Text(downcast(batch, name)?),
            ColumnKind::Json => ColumnReader::Json(downcast(batch, name)?),
            ColumnKind::Float => ColumnReader::Float(downcast(batch, name)?),
            ColumnKind::Timestamp => ColumnReader::Timestamp(downcast(batch, name)?),
            ColumnKind::Blob => ColumnReader::Blob(downcast(batch, name)?),
        };
        readers.push((*name, reader));
    }

    let mut rows = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let mut record = Record::new();
        for (name, reader) in &readers {
            let value = match reader {
                ColumnReader::Text(a) if !a.is_null(row) => {
                    FieldValue::Text(a.value(row).to_string())
                }
                ColumnReader::Json(a) if !a.is_null(row) => {
                    FieldValue::Json(serde_json::from_str(a.value(row))?)
                }
                ColumnReader::Float(a) if !a.is_null(row) => FieldValue::Float(a.value(row)),
                ColumnReader::Timestamp(a) if !a.is_null(row) => {
                    let at = Utc.timestamp_micros(a.value(row)).single().ok_or_else(|| {
                        MemoryError::Storage(format!("Failed to parse {name} timestamp"))
                    })?;
                    FieldValue::Timestamp(at)
                }
                ColumnReader::Blob(a) if !a.is_null(row) => FieldValue::Blob(a.value(row).to_vec()),
                _ => continue,
            };
            record.insert((*name).to_string(), value);
        }
        rows.push((ids.value(row).to_string(), record));
    }
    Ok(rows)
}

/// Durable [`RecordStore`] backed by LanceDB, one table per collection.
pub struct LanceStore {
    connection: Connection,
    tables: HashMap<Collection, Table>,
}

impl LanceStore {
    /// Connect to the database at `path`, creating any missing tables
    pub async fn open(path: &Path) -> Result<Self> {
        let uri = path
            .to_str()
            .ok_or_else(|| MemoryError::Storage("Invalid path encoding".to_string()))?;

        let connection = lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to connect to LanceDB: {e}")))?;

        let existing = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to list tables: {e}")))?;

        let mut tables = HashMap::new();
        for collection in Collection::ALL {
            let table = if existing.iter().any(|name| name == collection.name()) {
                Self::open_table(&connection, collection).await?
            } else {
                Self::create_table(&connection, collection).await?
            };
            tables.insert(collection, table);
        }

        tracing::debug!(path = %path.display(), "Opened LanceDB store");
        Ok(Self { connection, tables })
    }

    async fn open_table(connection: &Connection, collection: Collection) -> Result<Table> {
        connection
            .open_table(collection.name())
            .execute()
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open {collection} table: {e}")))
    }

    async fn create_table(connection: &Connection, collection: Collection) -> Result<Table> {
        let schema = schema(collection);
        let batch = RecordBatch::new_empty(schema.clone());
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        connection
            .create_table(collection.name(), Box::new(batches))
            .execute()
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to create {collection} table: {e}")))
    }

    fn table(&self, collection: Collection) -> Result<&Table> {
        self.tables
            .get(&collection)
            .ok_or_else(|| MemoryError::Storage(format!("{collection} table not initialized")))
    }

    /// Names of the tables in the underlying database
    pub async fn table_names(&self) -> Result<Vec<String>> {
        self.connection
            .table_names()
            .execute()
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to list tables: {e}")))
    }

    /// Number of rows stored for a collection
    pub async fn count(&self, collection: Collection) -> Result<usize> {
        self.table(collection)?
            .count_rows(None)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to count rows: {e}")))
    }

    async fn query(&self, collection: Collection, filter: Option<String>) -> Result<Vec<RecordBatch>> {
        let mut query = self.table(collection)?.query();
        if let Some(filter) = filter {
            query = query.only_if(filter);
        }
        let stream = query
            .execute()
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to query {collection}: {e}")))?;

        stream
            .try_collect()
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to collect query results: {e}")))
    }
}

#[async_trait]
impl RecordStore for LanceStore {
    async fn put(&self, collection: Collection, id: &str, record: Record) -> Result<()> {
        let table = self.table(collection)?;
        let batch = records_to_batch(collection, &[(id, &record)])?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema(collection));

        table
            .delete(&id_filter(id))
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to replace record {id}: {e}")))?;

        table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to insert record {id}: {e}")))?;

        Ok(())
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>> {
        for batch in self.query(collection, Some(id_filter(id))).await? {
            if let Some((_, record)) = batch_to_records(collection, &batch)?.into_iter().next() {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool> {
        let table = self.table(collection)?;

        let existing = table
            .count_rows(Some(id_filter(id)))
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to count rows: {e}")))?;
        if existing == 0 {
            return Ok(false);
        }

        table
            .delete(&id_filter(id))
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to delete record {id}: {e}")))?;
        Ok(true)
    }

    async fn list_ids(&self, collection: Collection) -> Result<Vec<String>> {
        let stream = self
            .table(collection)?
            .query()
            .select(Select::columns(&["id"]))
            .execute()
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to list {collection} ids: {e}")))?;
        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to collect query results: {e}")))?;

        let mut ids = Vec::new();
        for batch in &batches {
            let column = downcast::<StringArray>(batch, "id")?;
            ids.extend((0..column.len()).map(|row| column.value(row).to_string()));
        }
        ids.sort();
        Ok(ids)
    }

    async fn scan(&self, collection: Collection) -> Result<Vec<(String, Record)>> {
        let mut rows = Vec::new();
        for batch in self.query(collection, None).await? {
            rows.extend(batch_to_records(collection, &batch)?);
        }
        Ok(rows)
    }

    async fn clear(&self, collection: Collection) -> Result<usize> {
        let removed = self.count(collection).await?;
        if removed > 0 {
            self.table(collection)?
                .delete("id IS NOT NULL")
                .await
                .map_err(|e| MemoryError::Storage(format!("Failed to clear {collection}: {e}")))?;
        }
        Ok(removed)
    }
}
