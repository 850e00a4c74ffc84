//! Volatile record store

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::storage::{Collection, Record, RecordStore};

/// Keeps every collection in process memory. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<Collection, BTreeMap<String, Record>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in a collection
    pub async fn len(&self, collection: Collection) -> usize {
        self.collections
            .read()
            .await
            .get(&collection)
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn put(&self, collection: Collection, id: &str, record: Record) -> Result<()> {
        self.collections
            .write()
            .await
            .entry(collection)
            .or_default()
            .insert(id.to_string(), record);
        Ok(())
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>> {
        Ok(self
            .collections
            .read()
            .await
            .get(&collection)
            .and_then(|records| records.get(id))
            .cloned())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool> {
        Ok(self
            .collections
            .write()
            .await
            .get_mut(&collection)
            .is_some_and(|records| records.remove(id).is_some()))
    }

    async fn list_ids(&self, collection: Collection) -> Result<Vec<String>> {
        Ok(self
            .collections
            .read()
            .await
            .get(&collection)
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn scan(&self, collection: Collection) -> Result<Vec<(String, Record)>> {
        Ok(self
            .collections
            .read()
            .await
            .get(&collection)
            .map(|records| {
                records
                    .iter()
                    .map(|(id, record)| (id.clone(), record.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn clear(&self, collection: Collection) -> Result<usize> {
        Ok(self
            .collections
            .write()
            .await
            .remove(&collection)
            .map_or(0, |records| records.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FieldValue;

    fn record(content: &str) -> Record {
        let mut record = Record::new();
        record.insert("content".into(), FieldValue::Text(content.to_string()));
        record
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryStore::new();
        store
            .put(Collection::Memories, "a", record("first"))
            .await
            .unwrap();

        assert_eq!(
            store.get(Collection::Memories, "a").await.unwrap(),
            Some(record("first"))
        );
        assert!(store.delete(Collection::Memories, "a").await.unwrap());
        assert!(!store.delete(Collection::Memories, "a").await.unwrap());
        assert!(store.get(Collection::Memories, "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_replaces_existing() {
        let store = InMemoryStore::new();
        store.put(Collection::Memories, "a", record("old")).await.unwrap();
        store.put(Collection::Memories, "a", record("new")).await.unwrap();

        assert_eq!(store.len(Collection::Memories).await, 1);
        assert_eq!(
            store.get(Collection::Memories, "a").await.unwrap(),
            Some(record("new"))
        );
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let store = InMemoryStore::new();
        store.put(Collection::Memories, "x", record("m")).await.unwrap();
        store
            .put(Collection::KnowledgeGraph, "y", record("g"))
            .await
            .unwrap();

        assert_eq!(store.list_ids(Collection::Memories).await.unwrap(), vec!["x"]);
        assert_eq!(
            store.list_ids(Collection::KnowledgeGraph).await.unwrap(),
            vec!["y"]
        );

        assert_eq!(store.clear(Collection::KnowledgeGraph).await.unwrap(), 1);
        assert!(store.scan(Collection::KnowledgeGraph).await.unwrap().is_empty());
        assert_eq!(store.scan(Collection::Memories).await.unwrap().len(), 1);
    }
}
