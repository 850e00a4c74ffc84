//! Integration tests for the memory manager
//!
//! Runs the manager over the in-memory store and the bag-of-words mock
//! embedder.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use engram::config::MemoryConfig;
use engram::error::MemoryError;
use engram::memory::types::{META_ACCESS_COUNT, META_CREATED, META_LAST_ACCESSED, Metadata};
use engram::memory::{MemoryManager, MemoryType, NewMemory, SearchQuery, TimeRange};
use engram::storage::{Collection, InMemoryStore, Record, RecordStore};
use engram::testing::{
    FlakyStore, MOCK_DIMENSION, MockEmbeddingProvider, UnavailableEmbeddingProvider,
    in_memory_manager,
};
use serde_json::json;

/// Test fixture: manager with default config
async fn create_test_manager() -> MemoryManager {
    in_memory_manager(MemoryConfig::default()).await.unwrap()
}

/// Test fixture: manager over a store the test keeps a handle to
async fn manager_with_store(store: Arc<dyn RecordStore>) -> MemoryManager {
    MemoryManager::open(
        store,
        Arc::new(MockEmbeddingProvider::default()),
        MemoryConfig::default(),
        MOCK_DIMENSION,
    )
    .await
    .unwrap()
}

/// Store whose `put` writes the record and then keeps the caller waiting
#[derive(Default)]
struct SlowAckStore {
    inner: InMemoryStore,
}

#[async_trait]
impl RecordStore for SlowAckStore {
    async fn put(&self, collection: Collection, id: &str, record: Record) -> engram::Result<()> {
        self.inner.put(collection, id, record).await?;
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        Ok(())
    }

    async fn get(&self, collection: Collection, id: &str) -> engram::Result<Option<Record>> {
        self.inner.get(collection, id).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> engram::Result<bool> {
        self.inner.delete(collection, id).await
    }

    async fn list_ids(&self, collection: Collection) -> engram::Result<Vec<String>> {
        self.inner.list_ids(collection).await
    }
}

fn metadata(value: serde_json::Value) -> Metadata {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Metadata::new(),
    }
}

mod store_tests {
    use super::*;

    #[tokio::test]
    async fn test_store_returns_retrievable_entry() {
        let manager = create_test_manager().await;

        let id = manager
            .store_memory(
                NewMemory::new("Rust guarantees memory safety", "fact")
                    .with_tags(vec!["rust".to_string()]),
            )
            .await
            .unwrap();

        let entry = manager.get_memory(id).await.unwrap();
        assert_eq!(entry.id, id);
        assert_eq!(entry.content, "Rust guarantees memory safety");
        assert_eq!(entry.memory_type, MemoryType::Fact);
        assert_eq!(entry.tags, vec!["rust".to_string()]);
        assert_eq!(entry.embedding.as_ref().map(Vec::len), Some(MOCK_DIMENSION));
    }

    #[tokio::test]
    async fn test_store_stamps_bookkeeping_metadata() {
        let manager = create_test_manager().await;

        let id = manager
            .store_memory(
                NewMemory::new("Deploy on Fridays is risky", "experience")
                    .with_metadata(metadata(json!({"source": "user"}))),
            )
            .await
            .unwrap();

        let entry = manager.get_memory(id).await.unwrap();
        assert_eq!(entry.metadata.get("source"), Some(&json!("user")));
        assert!(entry.metadata.contains_key(META_CREATED));
        assert!(entry.metadata.contains_key(META_LAST_ACCESSED));
        assert_eq!(entry.metadata.get(META_ACCESS_COUNT), Some(&json!(0)));
        assert_eq!(entry.access_count(), 0);
    }

    #[tokio::test]
    async fn test_store_computes_importance_when_absent() {
        let manager = create_test_manager().await;
        let content = "Remember to renew the TLS certificate";

        let id = manager
            .store_memory(
                NewMemory::new(content, "task")
                    .with_metadata(metadata(json!({"priority": "high"}))),
            )
            .await
            .unwrap();

        let expected = engram::memory::importance::score(
            content,
            &MemoryType::Task,
            &metadata(json!({"priority": "high"})),
        );
        let entry = manager.get_memory(id).await.unwrap();
        assert_eq!(entry.importance, expected);
    }

    #[tokio::test]
    async fn test_store_keeps_explicit_importance() {
        let manager = create_test_manager().await;
        let id = manager
            .store_memory(NewMemory::new("explicit", "fact").with_importance(0.42))
            .await
            .unwrap();
        assert_eq!(manager.get_memory(id).await.unwrap().importance, 0.42);
    }

    #[tokio::test]
    async fn test_store_persists_record() {
        let store = Arc::new(InMemoryStore::new());
        let manager = manager_with_store(store.clone()).await;

        let id = manager
            .store_memory(NewMemory::new("persist me", "fact"))
            .await
            .unwrap();

        let record = store
            .get(Collection::Memories, &id.to_string())
            .await
            .unwrap();
        assert!(record.is_some());
        assert_eq!(store.len(Collection::Memories).await, 1);
    }

    #[tokio::test]
    async fn test_store_rejects_invalid_input() {
        let manager = create_test_manager().await;

        for content in ["", "   ", "\n\t"] {
            let err = manager
                .store_memory(NewMemory::new(content, "fact"))
                .await
                .unwrap_err();
            assert!(matches!(err, MemoryError::Validation(_)), "{content:?}");
        }

        for importance in [-0.1, 1.5, f64::NAN] {
            let err = manager
                .store_memory(NewMemory::new("fine", "fact").with_importance(importance))
                .await
                .unwrap_err();
            assert!(matches!(err, MemoryError::Validation(_)));
        }

        assert_eq!(manager.get_memory_stats().await.total, 0);
    }

    #[tokio::test]
    async fn test_store_with_unavailable_embedder_changes_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let manager = MemoryManager::open(
            store.clone(),
            Arc::new(UnavailableEmbeddingProvider),
            MemoryConfig::default(),
            MOCK_DIMENSION,
        )
        .await
        .unwrap();

        let err = manager
            .store_memory(NewMemory::new("never stored", "fact"))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Initialization(_)));

        let stats = manager.get_memory_stats().await;
        assert_eq!(stats.total, 0);
        assert_eq!(stats.index_size, 0);
        assert_eq!(store.len(Collection::Memories).await, 0);
    }

    #[tokio::test]
    async fn test_store_rejects_wrong_dimension_embedding() {
        let store = Arc::new(InMemoryStore::new());
        let manager = MemoryManager::open(
            store.clone(),
            Arc::new(MockEmbeddingProvider::new(8)),
            MemoryConfig::default(),
            MOCK_DIMENSION,
        )
        .await
        .unwrap();

        let err = manager
            .store_memory(NewMemory::new("short vector", "fact"))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Embedding(_)));
        assert_eq!(manager.get_memory_stats().await.index_size, 0);
        assert_eq!(store.len(Collection::Memories).await, 0);
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_cache_and_index_untouched() {
        let store = Arc::new(FlakyStore::new());
        let manager = manager_with_store(store.clone()).await;

        manager
            .store_memory(NewMemory::new("first memory", "fact"))
            .await
            .unwrap();

        store.fail_puts(true);
        let err = manager
            .store_memory(NewMemory::new("second memory", "fact"))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Storage(_)));

        let stats = manager.get_memory_stats().await;
        assert_eq!(stats.total, 1);
        assert_eq!(stats.index_size, 1);
        assert_eq!(store.inner().len(Collection::Memories).await, 1);

        store.fail_puts(false);
        manager
            .store_memory(NewMemory::new("third memory", "fact"))
            .await
            .unwrap();
        assert_eq!(manager.get_memory_stats().await.index_size, 2);
    }

    #[tokio::test]
    async fn test_abandoned_store_still_lands_in_cache_and_index() {
        let store = Arc::new(SlowAckStore::default());
        let manager = manager_with_store(store.clone()).await;

        let outcome = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            manager.store_memory(NewMemory::new("slow acknowledgement", "fact")),
        )
        .await;
        assert!(outcome.is_err());

        tokio::time::sleep(std::time::Duration::from_millis(400)).await;

        let ids = store.list_ids(Collection::Memories).await.unwrap();
        let stats = manager.get_memory_stats().await;
        assert_eq!(ids.len(), 1);
        assert_eq!(stats.total, 1);
        assert_eq!(stats.index_size, 1);
        let id = ids[0].parse().unwrap();
        assert_eq!(
            manager.get_memory(id).await.unwrap().content,
            "slow acknowledgement"
        );

        // The writer lock was released with the finished task
        manager
            .store_memory(NewMemory::new("next memory", "fact"))
            .await
            .unwrap();
        assert_eq!(manager.get_memory_stats().await.index_size, 2);
    }

    #[tokio::test]
    async fn test_type_tag_kept_verbatim() {
        let manager = create_test_manager().await;
        let id = manager
            .store_memory(NewMemory::new("hello world", "Fact"))
            .await
            .unwrap();

        let entry = manager.get_memory(id).await.unwrap();
        assert_eq!(entry.memory_type.as_str(), "Fact");
        assert_ne!(entry.memory_type, MemoryType::Fact);

        let lowercase = manager
            .search_memories(
                SearchQuery::new("hello world").with_memory_types(vec![MemoryType::Fact]),
            )
            .await
            .unwrap();
        assert!(lowercase.is_empty());

        let verbatim = manager
            .search_memories(
                SearchQuery::new("hello world").with_memory_types(vec!["Fact".into()]),
            )
            .await
            .unwrap();
        assert_eq!(verbatim.len(), 1);
    }

    #[tokio::test]
    async fn test_capacity_triggers_automatic_compaction() {
        let manager = in_memory_manager(MemoryConfig::default().with_max_entries(3))
            .await
            .unwrap();

        for (content, importance) in [
            ("alpha memory", 0.9),
            ("beta memory", 0.8),
            ("gamma memory", 0.1),
            ("delta memory", 0.7),
        ] {
            manager
                .store_memory(NewMemory::new(content, "fact").with_importance(importance))
                .await
                .unwrap();
        }

        let stats = manager.get_memory_stats().await;
        assert_eq!(stats.total, 3);
        assert_eq!(stats.index_size, 3);
        assert!(
            manager
                .list_memories()
                .await
                .iter()
                .all(|e| e.content != "gamma memory")
        );
    }

    #[tokio::test]
    async fn test_interval_triggers_compaction_pass() {
        let manager = in_memory_manager(MemoryConfig::default().with_compaction_interval_secs(0))
            .await
            .unwrap();
        let before = manager.get_memory_stats().await.last_compaction;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        manager
            .store_memory(NewMemory::new("tick", "fact"))
            .await
            .unwrap();

        let stats = manager.get_memory_stats().await;
        assert!(stats.last_compaction > before);
        assert_eq!(stats.total, 1);
    }
}

mod search_tests {
    use super::*;

    async fn seeded_manager() -> MemoryManager {
        let manager = create_test_manager().await;
        for content in [
            "The weather is sunny today",
            "Python is a programming language",
            "Machine learning requires data",
        ] {
            manager
                .store_memory(NewMemory::new(content, "fact"))
                .await
                .unwrap();
        }
        manager
    }

    #[tokio::test]
    async fn test_search_ranks_relevant_entry_first() {
        let manager = seeded_manager().await;

        let results = manager
            .search_memories(SearchQuery::new("programming language").with_limit(2))
            .await
            .unwrap();

        assert!(!results.is_empty());
        assert_eq!(results[0].entry.content, "Python is a programming language");
        assert_eq!(results[0].rank, 1);
        assert!(results.len() <= 2);
    }

    #[tokio::test]
    async fn test_exact_content_round_trip() {
        let manager = seeded_manager().await;

        let results = manager
            .search_memories(SearchQuery::new("Machine learning requires data").with_limit(1))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entry.content, "Machine learning requires data");
        assert!(results[0].similarity_score >= 0.99);
    }

    #[tokio::test]
    async fn test_search_empty_store_returns_empty() {
        let manager = create_test_manager().await;
        let results = manager
            .search_memories(SearchQuery::new("anything"))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_search_nothing_above_threshold_returns_empty() {
        let manager = seeded_manager().await;
        let results = manager
            .search_memories(SearchQuery::new("zyzzyva quokka").with_min_similarity(0.9))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_results_ordered_and_ranked() {
        let manager = create_test_manager().await;
        for content in [
            "rust borrow checker",
            "rust borrow checker lifetimes",
            "rust borrow checker lifetimes traits generics",
        ] {
            manager
                .store_memory(NewMemory::new(content, "knowledge"))
                .await
                .unwrap();
        }

        let results = manager
            .search_memories(
                SearchQuery::new("rust borrow checker")
                    .with_limit(3)
                    .with_min_similarity(0.0),
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].entry.content, "rust borrow checker");
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.rank, i + 1);
        }
        for pair in results.windows(2) {
            assert!(pair[0].similarity_score >= pair[1].similarity_score);
        }
    }

    #[tokio::test]
    async fn test_search_filters_by_type() {
        let manager = create_test_manager().await;
        manager
            .store_memory(NewMemory::new("deploy the service", "task"))
            .await
            .unwrap();
        manager
            .store_memory(NewMemory::new("deploy the service went well", "experience"))
            .await
            .unwrap();

        let results = manager
            .search_memories(
                SearchQuery::new("deploy the service").with_memory_types(vec![MemoryType::Experience]),
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entry.memory_type, MemoryType::Experience);
        assert_eq!(results[0].rank, 1);
    }

    #[tokio::test]
    async fn test_search_filters_by_time_range() {
        let manager = create_test_manager().await;
        manager
            .store_memory(NewMemory::new("coffee break", "conversation"))
            .await
            .unwrap();

        let now = Utc::now();
        let past = TimeRange::new(now - Duration::days(2), now - Duration::days(1)).unwrap();
        let around = TimeRange::new(now - Duration::hours(1), now + Duration::hours(1)).unwrap();

        let none = manager
            .search_memories(SearchQuery::new("coffee break").with_time_range(past))
            .await
            .unwrap();
        assert!(none.is_empty());

        let some = manager
            .search_memories(SearchQuery::new("coffee break").with_time_range(around))
            .await
            .unwrap();
        assert_eq!(some.len(), 1);
    }

    #[tokio::test]
    async fn test_search_updates_access_bookkeeping() {
        let manager = seeded_manager().await;

        for _ in 0..2 {
            manager
                .search_memories(SearchQuery::new("programming language").with_limit(1))
                .await
                .unwrap();
        }

        let entry = manager
            .list_memories()
            .await
            .into_iter()
            .find(|e| e.content == "Python is a programming language")
            .unwrap();
        assert_eq!(entry.access_count(), 2);

        let untouched = manager
            .list_memories()
            .await
            .into_iter()
            .find(|e| e.content == "The weather is sunny today")
            .unwrap();
        assert_eq!(untouched.access_count(), 0);
    }

    #[tokio::test]
    async fn test_search_limit_truncates() {
        let manager = create_test_manager().await;
        for n in 0..6 {
            manager
                .store_memory(NewMemory::new(format!("shared words entry {n}"), "fact"))
                .await
                .unwrap();
        }

        let results = manager
            .search_memories(SearchQuery::new("shared words entry").with_limit(4))
            .await
            .unwrap();
        assert_eq!(results.len(), 4);
    }

    #[tokio::test]
    async fn test_search_rejects_invalid_queries() {
        let manager = seeded_manager().await;

        let cases = [
            SearchQuery::new("  "),
            SearchQuery::new("ok").with_limit(0),
            SearchQuery::new("ok").with_min_similarity(f32::NAN),
        ];
        for query in cases {
            let err = manager.search_memories(query).await.unwrap_err();
            assert!(matches!(err, MemoryError::Validation(_)));
        }

        let now = Utc::now();
        let mut inverted = SearchQuery::new("ok");
        inverted.time_range = Some(TimeRange {
            start: now,
            end: now - Duration::hours(1),
        });
        assert!(matches!(
            manager.search_memories(inverted).await,
            Err(MemoryError::Validation(_))
        ));
    }
}

mod stats_tests {
    use super::*;

    #[tokio::test]
    async fn test_stats_summary() {
        let manager = create_test_manager().await;
        for (content, kind, importance) in [
            ("a", "fact", 0.9),
            ("b", "fact", 0.5),
            ("c", "task", 0.2),
            ("d", "recipe", 0.6),
        ] {
            manager
                .store_memory(NewMemory::new(content, kind).with_importance(importance))
                .await
                .unwrap();
        }

        let stats = manager.get_memory_stats().await;
        assert_eq!(stats.total, 4);
        assert_eq!(stats.index_size, 4);
        assert_eq!(stats.by_type.get("fact"), Some(&2));
        assert_eq!(stats.by_type.get("task"), Some(&1));
        assert_eq!(stats.by_type.get("recipe"), Some(&1));
        assert_eq!(stats.importance_bands.high, 1);
        assert_eq!(stats.importance_bands.medium, 2);
        assert_eq!(stats.importance_bands.low, 1);
        assert!((stats.avg_importance - 0.55).abs() < 1e-9);
        assert_eq!(stats.knowledge_graph_nodes, 0);
    }

    #[tokio::test]
    async fn test_stats_empty_store() {
        let stats = create_test_manager().await.get_memory_stats().await;
        assert_eq!(stats.total, 0);
        assert_eq!(stats.avg_importance, 0.0);
        assert!(stats.by_type.is_empty());
    }

    #[tokio::test]
    async fn test_list_memories_newest_first() {
        let manager = create_test_manager().await;
        for content in ["first", "second", "third"] {
            manager
                .store_memory(NewMemory::new(content, "fact"))
                .await
                .unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let contents: Vec<String> = manager
            .list_memories()
            .await
            .into_iter()
            .map(|e| e.content)
            .collect();
        assert_eq!(contents, vec!["third", "second", "first"]);
    }
}

mod concurrency_tests {
    use super::*;
    use futures::future::join_all;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_operations_keep_store_cache_and_index_aligned() {
        let store = Arc::new(InMemoryStore::new());
        let manager = Arc::new(manager_with_store(store.clone()).await);

        let stores = (0..50).map(|i| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                manager
                    .store_memory(
                        NewMemory::new(format!("shared memory number {i}"), "fact")
                            .with_importance((i % 10) as f64 / 10.0),
                    )
                    .await
                    .map(|_| ())
            })
        });
        let searches = (0..10).map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                let results = manager
                    .search_memories(
                        SearchQuery::new("shared memory number")
                            .with_limit(5)
                            .with_min_similarity(0.0),
                    )
                    .await?;
                let ids: HashSet<_> = results.iter().map(|r| r.entry.id).collect();
                assert_eq!(ids.len(), results.len());
                for (i, result) in results.iter().enumerate() {
                    assert_eq!(result.rank, i + 1);
                }
                Ok::<(), MemoryError>(())
            })
        });
        let compactions = (0..5).map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.compress_memories(Some(30)).await.map(|_| ()) })
        });

        let handles: Vec<_> = stores.chain(searches).chain(compactions).collect();
        for outcome in join_all(handles).await {
            outcome.unwrap().unwrap();
        }

        let stats = manager.get_memory_stats().await;
        assert_eq!(stats.index_size, stats.total);
        assert_eq!(store.len(Collection::Memories).await, stats.total);
        assert!(stats.total <= 50);

        let results = manager
            .search_memories(
                SearchQuery::new("shared memory number")
                    .with_limit(50)
                    .with_min_similarity(0.0),
            )
            .await
            .unwrap();
        assert_eq!(results.len(), stats.total);
        for result in &results {
            assert!(manager.get_memory(result.entry.id).await.is_some());
            assert!(
                store
                    .get(Collection::Memories, &result.entry.id.to_string())
                    .await
                    .unwrap()
                    .is_some()
            );
        }
    }
}
