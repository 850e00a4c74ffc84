//! Field-map records and the codecs for entries and graph nodes

use std::collections::{BTreeMap, BTreeSet};

use bytes::{Buf, BufMut, BytesMut};
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{MemoryError, Result};
use crate::graph::{KnowledgeNode, NodeProperties};
use crate::memory::types::{MemoryEntry, MemoryType, Metadata};

/// A single typed field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Float(f64),
    Timestamp(DateTime<Utc>),
    Json(Value),
    Blob(Vec<u8>),
}

impl FieldValue {
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "text",
            FieldValue::Float(_) => "float",
            FieldValue::Timestamp(_) => "timestamp",
            FieldValue::Json(_) => "json",
            FieldValue::Blob(_) => "blob",
        }
    }
}

/// A stored record: field name to value
pub type Record = BTreeMap<String, FieldValue>;

fn missing(field: &str) -> MemoryError {
    MemoryError::Storage(format!("Record is missing field '{field}'"))
}

fn mismatch(field: &str, expected: &str, found: &FieldValue) -> MemoryError {
    MemoryError::Storage(format!(
        "Field '{field}' should be {expected}, found {}",
        found.kind()
    ))
}

fn text<'a>(record: &'a Record, field: &str) -> Result<&'a str> {
    match record.get(field) {
        Some(FieldValue::Text(s)) => Ok(s),
        Some(other) => Err(mismatch(field, "text", other)),
        None => Err(missing(field)),
    }
}

fn float(record: &Record, field: &str) -> Result<f64> {
    match record.get(field) {
        Some(FieldValue::Float(v)) => Ok(*v),
        Some(other) => Err(mismatch(field, "float", other)),
        None => Err(missing(field)),
    }
}

fn timestamp(record: &Record, field: &str) -> Result<DateTime<Utc>> {
    match record.get(field) {
        Some(FieldValue::Timestamp(t)) => Ok(*t),
        Some(other) => Err(mismatch(field, "timestamp", other)),
        None => Err(missing(field)),
    }
}

fn json<'a>(record: &'a Record, field: &str) -> Result<Option<&'a Value>> {
    match record.get(field) {
        Some(FieldValue::Json(v)) => Ok(Some(v)),
        Some(other) => Err(mismatch(field, "json", other)),
        None => Ok(None),
    }
}

/// Encode a vector as consecutive little-endian `f32`s.
pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(vector.len() * 4);
    for value in vector {
        buf.put_f32_le(*value);
    }
    buf.to_vec()
}

/// Decode a blob written by [`encode_embedding`].
pub fn decode_embedding(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(MemoryError::Storage(format!(
            "Embedding blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    let mut buf = blob;
    let mut vector = Vec::with_capacity(blob.len() / 4);
    while buf.has_remaining() {
        vector.push(buf.get_f32_le());
    }
    Ok(vector)
}

/// Serialize a memory entry for the `memories` collection
pub fn entry_to_record(entry: &MemoryEntry) -> Record {
    let mut record = Record::new();
    record.insert("content".into(), FieldValue::Text(entry.content.clone()));
    record.insert(
        "memory_type".into(),
        FieldValue::Text(entry.memory_type.as_str().to_string()),
    );
    record.insert("importance".into(), FieldValue::Float(entry.importance));
    record.insert("timestamp".into(), FieldValue::Timestamp(entry.timestamp));
    record.insert(
        "metadata".into(),
        FieldValue::Json(Value::Object(entry.metadata.clone())),
    );
    if let Some(embedding) = &entry.embedding {
        record.insert(
            "embedding".into(),
            FieldValue::Blob(encode_embedding(embedding)),
        );
    }
    record.insert(
        "tags".into(),
        FieldValue::Json(Value::from(entry.tags.clone())),
    );
    record
}

/// Rebuild a memory entry from its stored record.
///
/// A missing or undecodable embedding yields `embedding: None`; the caller
/// decides what to do with such entries. Any other malformed field is an error.
pub fn record_to_entry(id: &str, record: &Record) -> Result<MemoryEntry> {
    let id = Uuid::parse_str(id)
        .map_err(|e| MemoryError::Storage(format!("Failed to parse UUID '{id}': {e}")))?;

    let metadata: Metadata = match json(record, "metadata")? {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::Null) | None => Metadata::new(),
        Some(other) => {
            return Err(MemoryError::Storage(format!(
                "Field 'metadata' should be an object, found {other}"
            )));
        }
    };

    let tags: Vec<String> = match json(record, "tags")? {
        Some(value) => serde_json::from_value(value.clone())?,
        None => Vec::new(),
    };

    let embedding = match record.get("embedding") {
        Some(FieldValue::Blob(blob)) => decode_embedding(blob).ok(),
        _ => None,
    };

    Ok(MemoryEntry {
        id,
        content: text(record, "content")?.to_string(),
        memory_type: MemoryType::from(text(record, "memory_type")?),
        importance: float(record, "importance")?,
        timestamp: timestamp(record, "timestamp")?,
        metadata,
        embedding,
        tags,
    })
}

/// Serialize a knowledge node for the `knowledge_graph` collection
pub fn node_to_record(node: &KnowledgeNode) -> Result<Record> {
    let mut record = Record::new();
    record.insert("content".into(), FieldValue::Text(node.content.clone()));
    record.insert("node_type".into(), FieldValue::Text(node.node_type.clone()));
    record.insert(
        "properties".into(),
        FieldValue::Json(serde_json::to_value(&node.properties)?),
    );
    record.insert(
        "connections".into(),
        FieldValue::Json(serde_json::to_value(&node.connections)?),
    );
    record.insert("strength".into(), FieldValue::Float(node.strength));
    Ok(record)
}

pub fn record_to_node(id: &str, record: &Record) -> Result<KnowledgeNode> {
    let properties: NodeProperties = match json(record, "properties")? {
        Some(value) => serde_json::from_value(value.clone())?,
        None => return Err(missing("properties")),
    };
    let connections: BTreeSet<String> = match json(record, "connections")? {
        Some(value) => serde_json::from_value(value.clone())?,
        None => BTreeSet::new(),
    };

    Ok(KnowledgeNode {
        id: id.to_string(),
        content: text(record, "content")?.to_string(),
        node_type: text(record, "node_type")?.to_string(),
        properties,
        connections,
        strength: float(record, "strength")?,
    })
}
