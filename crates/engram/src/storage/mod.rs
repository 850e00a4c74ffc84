//! Persistent record storage
//!
//! The manager persists through [`RecordStore`], a small keyed-record
//! interface over named collections. [`LanceStore`] is the durable adapter;
//! [`InMemoryStore`] backs tests and throwaway instances.

pub mod lance;
pub mod memory;
pub mod record;

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;

pub use lance::LanceStore;
pub use memory::InMemoryStore;
pub use record::{FieldValue, Record};

/// Named collections the manager writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Memories,
    KnowledgeGraph,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Memories, Collection::KnowledgeGraph];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Memories => "memories",
            Collection::KnowledgeGraph => "knowledge_graph",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Durable keyed storage of field maps.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or replace the record stored under `id`
    async fn put(&self, collection: Collection, id: &str, record: Record) -> Result<()>;

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>>;

    /// Remove a record. Returns whether it existed.
    async fn delete(&self, collection: Collection, id: &str) -> Result<bool>;

    async fn list_ids(&self, collection: Collection) -> Result<Vec<String>>;

    /// Every `(id, record)` pair in the collection
    async fn scan(&self, collection: Collection) -> Result<Vec<(String, Record)>> {
        let mut records = Vec::new();
        for id in self.list_ids(collection).await? {
            if let Some(record) = self.get(collection, &id).await? {
                records.push((id, record));
            }
        }
        Ok(records)
    }

    /// Delete every record in the collection, returning how many were removed
    async fn clear(&self, collection: Collection) -> Result<usize> {
        let mut removed = 0;
        for id in self.list_ids(collection).await? {
            if self.delete(collection, &id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
