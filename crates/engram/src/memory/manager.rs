//! The memory manager
//!
//! Owns the entry cache, the similarity index and the knowledge-graph cache,
//! and keeps them consistent with the record store. Mutating operations
//! (store, compact, graph build and drop) are serialized by `writer`; readers
//! go through `state` and never wait on persistence. Once a store has started
//! persisting, it runs to completion in its own task even if the caller stops
//! waiting.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::config::{Config, MemoryConfig};
use crate::embedding::{EmbeddingProvider, FastEmbedProvider};
use crate::error::{MemoryError, Result};
use crate::graph::{self, KnowledgeGraph, KnowledgeNode};
use crate::index::SimilarityIndex;
use crate::memory::compaction::{CompactionPlan, CompactionReport, should_compact, survival_order};
use crate::memory::importance;
use crate::memory::types::{
    ImportanceBands, META_ACCESS_COUNT, META_CREATED, META_LAST_ACCESSED, MemoryEntry,
    MemoryStats, NewMemory, SearchQuery, SearchResult,
};
use crate::storage::record::{entry_to_record, node_to_record, record_to_entry, record_to_node};
use crate::storage::{Collection, LanceStore, RecordStore};

/// Directory under the data dir holding the LanceDB tables
pub const DATABASE_DIR: &str = "memory.lance";

struct MemoryState {
    entries: HashMap<Uuid, MemoryEntry>,
    index: SimilarityIndex,
    graph: BTreeMap<String, KnowledgeNode>,
    last_compaction: DateTime<Utc>,
}

/// Capacity-bounded semantic memory over a [`RecordStore`].
pub struct MemoryManager {
    store: Arc<dyn RecordStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: MemoryConfig,
    dimension: usize,
    state: Arc<RwLock<MemoryState>>,
    writer: Arc<Mutex<()>>,
}

impl MemoryManager {
    /// Open a manager over `store`, loading every persisted entry and graph node.
    ///
    /// Records that cannot be decoded are skipped. Entries whose embedding is
    /// missing or has the wrong length are cached but not indexed.
    pub async fn open(
        store: Arc<dyn RecordStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: MemoryConfig,
        dimension: usize,
    ) -> Result<Self> {
        if dimension == 0 {
            return Err(MemoryError::Config(
                "embedding dimension must be positive".to_string(),
            ));
        }

        let mut entries = Vec::new();
        for (id, record) in store.scan(Collection::Memories).await? {
            match record_to_entry(&id, &record) {
                Ok(mut entry) => {
                    if entry.embedding.as_ref().is_some_and(|v| v.len() != dimension) {
                        tracing::warn!(%id, "Stored embedding has the wrong dimension, entry not indexed");
                        entry.embedding = None;
                    } else if entry.embedding.is_none() {
                        tracing::warn!(%id, "Stored entry has no usable embedding, entry not indexed");
                    }
                    entries.push(entry);
                }
                Err(e) => tracing::warn!(%id, error = %e, "Skipping unreadable memory record"),
            }
        }
        entries.sort_by(survival_order);

        let mut index = SimilarityIndex::new(dimension);
        index.rebuild(
            entries
                .iter()
                .filter_map(|e| e.embedding.as_deref().map(|v| (e.id, v))),
        )?;

        let mut graph = BTreeMap::new();
        for (id, record) in store.scan(Collection::KnowledgeGraph).await? {
            match record_to_node(&id, &record) {
                Ok(node) => {
                    graph.insert(id, node);
                }
                Err(e) => tracing::warn!(%id, error = %e, "Skipping unreadable graph node"),
            }
        }

        tracing::info!(
            memories = entries.len(),
            indexed = index.len(),
            graph_nodes = graph.len(),
            embedder = embedder.name(),
            "Memory manager opened"
        );

        let state = MemoryState {
            entries: entries.into_iter().map(|e| (e.id, e)).collect(),
            index,
            graph,
            last_compaction: Utc::now(),
        };

        Ok(Self {
            store,
            embedder,
            config,
            dimension,
            state: Arc::new(RwLock::new(state)),
            writer: Arc::new(Mutex::new(())),
        })
    }

    /// Open the LanceDB store under the configured data dir with the
    /// configured fastembed model.
    pub async fn from_config(config: &Config) -> Result<Self> {
        std::fs::create_dir_all(&config.storage.data_dir)?;
        let store = LanceStore::open(&config.storage.data_dir.join(DATABASE_DIR)).await?;
        let embedder = FastEmbedProvider::new(&config.embedding)?;
        Self::open(
            Arc::new(store),
            Arc::new(embedder),
            config.memory.clone(),
            config.embedding.dimension,
        )
        .await
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self.embedder.embed(text).await?;
        if vector.len() != self.dimension {
            return Err(MemoryError::Embedding(format!(
                "{} returned a {}-dimensional vector, expected {}",
                self.embedder.name(),
                vector.len(),
                self.dimension
            )));
        }
        Ok(vector)
    }

    /// Store a new memory and return its id.
    ///
    /// Nothing reaches the cache or the index unless the record was persisted.
    /// May run a compaction pass afterwards.
    pub async fn store_memory(&self, memory: NewMemory) -> Result<Uuid> {
        validate_text("content", &memory.content)?;
        if let Some(importance) = memory.importance {
            validate_importance(importance)?;
        }

        let embedding = self.embed(&memory.content).await?;

        let writer = Arc::clone(&self.writer).lock_owned().await;

        let now = Utc::now();
        let mut metadata = memory.metadata.unwrap_or_default();
        metadata.insert(META_CREATED.to_string(), Value::from(now.to_rfc3339()));
        metadata.insert(META_ACCESS_COUNT.to_string(), Value::from(0));
        metadata.insert(META_LAST_ACCESSED.to_string(), Value::from(now.to_rfc3339()));

        let importance = memory.importance.unwrap_or_else(|| {
            importance::score(&memory.content, &memory.memory_type, &metadata)
        });

        let entry = MemoryEntry {
            id: Uuid::new_v4(),
            content: memory.content,
            memory_type: memory.memory_type,
            importance,
            timestamp: now,
            metadata,
            embedding: Some(embedding),
            tags: memory.tags,
        };
        let id = entry.id;

        let store = Arc::clone(&self.store);
        let state = Arc::clone(&self.state);
        // The writer guard travels with the task and is handed back for the
        // compaction check
        let published = tokio::spawn(async move {
            let result = persist_and_publish(store, state, entry).await;
            (writer, result)
        });
        let _writer = match published.await {
            Ok((writer, result)) => {
                result?;
                writer
            }
            Err(e) => {
                return Err(MemoryError::Storage(format!(
                    "store task for {id} did not finish: {e}"
                )));
            }
        };

        tracing::debug!(%id, importance, "Stored memory");

        let trigger = {
            let state = self.state.read().await;
            should_compact(
                state.entries.len(),
                self.config.max_entries,
                state.last_compaction,
                self.config.compaction_interval_secs,
                Utc::now(),
            )
        };
        if let Some(trigger) = trigger {
            tracing::debug!(?trigger, "Running automatic compaction");
            if let Err(e) = self.compact_locked(self.config.max_entries).await {
                tracing::warn!(%id, error = %e, "Automatic compaction failed");
            }
        }

        Ok(id)
    }

    /// Rank stored entries by similarity to `query.query`.
    ///
    /// Returns an empty list when nothing is stored or nothing passes the
    /// filters. Returned entries get their access counters bumped.
    pub async fn search_memories(&self, query: SearchQuery) -> Result<Vec<SearchResult>> {
        validate_text("query", &query.query)?;
        let limit = query.limit.unwrap_or(self.config.default_search_limit);
        if limit == 0 {
            return Err(MemoryError::Validation("limit must be positive".to_string()));
        }
        let min_similarity = query
            .min_similarity
            .unwrap_or(self.config.default_min_similarity);
        if !min_similarity.is_finite() {
            return Err(MemoryError::Validation(format!(
                "min_similarity must be finite, got {min_similarity}"
            )));
        }
        if let Some(range) = &query.time_range {
            if range.start > range.end {
                return Err(MemoryError::Validation(
                    "time range start is after its end".to_string(),
                ));
            }
        }

        if self.state.read().await.index.is_empty() {
            return Ok(Vec::new());
        }

        let vector = self.embed(&query.query).await?;

        let mut hits: Vec<(Uuid, f32)> = {
            let state = self.state.read().await;
            let candidates = limit.saturating_mul(2).min(state.index.len());
            state
                .index
                .search(&vector, candidates)?
                .into_iter()
                .filter(|(_, score)| *score >= min_similarity)
                .filter(|(id, _)| {
                    state.entries.get(id).is_some_and(|entry| {
                        query
                            .memory_types
                            .as_ref()
                            .is_none_or(|types| types.contains(&entry.memory_type))
                            && query
                                .time_range
                                .is_none_or(|range| range.contains(entry.timestamp))
                    })
                })
                .collect()
        };

        hits.sort_by(|a, b| b.1.total_cmp(&a.1));
        hits.truncate(limit);

        let mut state = self.state.write().await;
        let mut results = Vec::with_capacity(hits.len());
        for (id, similarity_score) in hits {
            // Compaction may have evicted the entry since ranking
            if let Some(entry) = state.entries.get_mut(&id) {
                entry.mark_accessed();
                results.push(SearchResult {
                    entry: entry.clone(),
                    similarity_score,
                    rank: results.len() + 1,
                });
            }
        }

        tracing::debug!(query = %query.query, results = results.len(), "Searched memories");
        Ok(results)
    }

    /// Shrink the store to `target_size` entries (the configured maximum when
    /// `None`), evicting the least important first.
    pub async fn compress_memories(&self, target_size: Option<usize>) -> Result<CompactionReport> {
        let _writer = self.writer.lock().await;
        self.compact_locked(target_size.unwrap_or(self.config.max_entries))
            .await
    }

    /// Compaction body. The caller must hold `writer`.
    async fn compact_locked(&self, target_size: usize) -> Result<CompactionReport> {
        let (original_size, plan) = {
            let state = self.state.read().await;
            (
                state.entries.len(),
                CompactionPlan::new(state.entries.values(), target_size),
            )
        };

        if plan.is_noop() {
            self.state.write().await.last_compaction = Utc::now();
            tracing::debug!(size = original_size, target_size, "Compaction not needed");
            return Ok(CompactionReport::unchanged(original_size));
        }

        let mut deleted = Vec::with_capacity(plan.evict.len());
        let mut failure = None;
        for id in &plan.evict {
            match self.store.delete(Collection::Memories, &id.to_string()).await {
                Ok(_) => deleted.push(*id),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        {
            let mut state = self.state.write().await;
            let MemoryState { entries, index, .. } = &mut *state;
            for id in &deleted {
                entries.remove(id);
            }

            let mut survivors: Vec<&MemoryEntry> = entries.values().collect();
            survivors.sort_by(|a, b| survival_order(a, b));
            index.rebuild(
                survivors
                    .iter()
                    .filter_map(|e| e.embedding.as_deref().map(|v| (e.id, v))),
            )?;

            if failure.is_none() {
                state.last_compaction = Utc::now();
            }
        }

        if let Some(e) = failure {
            tracing::warn!(
                removed = deleted.len(),
                planned = plan.evict.len(),
                error = %e,
                "Compaction stopped early"
            );
            return Err(e);
        }

        let report = CompactionReport::new(original_size, deleted);
        tracing::info!(
            original_size = report.original_size,
            new_size = report.new_size,
            removed = report.removed,
            "Compacted memories"
        );
        Ok(report)
    }

    /// Build a concept graph over the given entries, or over the best matches
    /// for `topic` when no ids are given, and persist its nodes.
    ///
    /// Unknown ids are ignored. At most `max_nodes` entries are used.
    pub async fn create_knowledge_graph(
        &self,
        topic: &str,
        memory_ids: Option<&[Uuid]>,
        max_nodes: Option<usize>,
    ) -> Result<KnowledgeGraph> {
        validate_text("topic", topic)?;
        let max_nodes = max_nodes.unwrap_or(self.config.default_max_nodes);
        if max_nodes == 0 {
            return Err(MemoryError::Validation(
                "max_nodes must be positive".to_string(),
            ));
        }

        let entries: Vec<MemoryEntry> = match memory_ids {
            Some(ids) if !ids.is_empty() => {
                let state = self.state.read().await;
                let mut seen = HashSet::new();
                ids.iter()
                    .filter(|id| seen.insert(**id))
                    .filter_map(|id| state.entries.get(id).cloned())
                    .take(max_nodes)
                    .collect()
            }
            _ => self
                .search_memories(SearchQuery::new(topic).with_limit(max_nodes))
                .await?
                .into_iter()
                .map(|result| result.entry)
                .collect(),
        };

        let nodes = graph::build(&entries);

        let _writer = self.writer.lock().await;
        for node in nodes.values() {
            self.store
                .put(Collection::KnowledgeGraph, &node.id, node_to_record(node)?)
                .await?;
        }

        self.state
            .write()
            .await
            .graph
            .extend(nodes.iter().map(|(id, node)| (id.clone(), node.clone())));

        let graph = KnowledgeGraph::new(topic, nodes);
        tracing::info!(
            topic,
            nodes = graph.nodes,
            connections = graph.connections,
            "Built knowledge graph"
        );
        Ok(graph)
    }

    /// Remove every persisted and cached graph node, returning how many were
    /// persisted.
    pub async fn drop_knowledge_graph(&self) -> Result<usize> {
        let _writer = self.writer.lock().await;
        let removed = self.store.clear(Collection::KnowledgeGraph).await?;
        self.state.write().await.graph.clear();
        tracing::info!(removed, "Dropped knowledge graph");
        Ok(removed)
    }

    pub async fn knowledge_node(&self, id: &str) -> Option<KnowledgeNode> {
        self.state.read().await.graph.get(id).cloned()
    }

    pub async fn get_memory(&self, id: Uuid) -> Option<MemoryEntry> {
        self.state.read().await.entries.get(&id).cloned()
    }

    /// All cached entries, newest first
    pub async fn list_memories(&self) -> Vec<MemoryEntry> {
        let state = self.state.read().await;
        let mut entries: Vec<MemoryEntry> = state.entries.values().cloned().collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        entries
    }

    pub async fn get_memory_stats(&self) -> MemoryStats {
        let state = self.state.read().await;

        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
        let mut importance_bands = ImportanceBands::default();
        let mut total_importance = 0.0;
        for entry in state.entries.values() {
            *by_type.entry(entry.memory_type.to_string()).or_default() += 1;
            importance_bands.record(entry.importance);
            total_importance += entry.importance;
        }

        let total = state.entries.len();
        MemoryStats {
            total,
            knowledge_graph_nodes: state.graph.len(),
            by_type,
            importance_bands,
            avg_importance: if total == 0 {
                0.0
            } else {
                total_importance / total as f64
            },
            index_size: state.index.len(),
            last_compaction: state.last_compaction,
        }
    }
}

/// Persist `entry`, then add it to the cache and the index. A record that
/// cannot be indexed is deleted again.
async fn persist_and_publish(
    store: Arc<dyn RecordStore>,
    state: Arc<RwLock<MemoryState>>,
    entry: MemoryEntry,
) -> Result<()> {
    let id = entry.id;
    store
        .put(Collection::Memories, &id.to_string(), entry_to_record(&entry))
        .await?;

    let indexed = {
        let mut state = state.write().await;
        let vector = entry.embedding.as_deref().unwrap_or_default();
        match state.index.insert(id, vector) {
            Ok(()) => {
                state.entries.insert(id, entry);
                Ok(())
            }
            Err(e) => Err(e),
        }
    };

    if let Err(e) = indexed {
        tracing::warn!(%id, error = %e, "Index insert failed, removing persisted record");
        if let Err(rollback) = store.delete(Collection::Memories, &id.to_string()).await {
            tracing::warn!(%id, error = %rollback, "Rollback delete failed");
        }
        return Err(e);
    }
    Ok(())
}

fn validate_text(what: &str, text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(MemoryError::Validation(format!("{what} must not be empty")));
    }
    Ok(())
}

fn validate_importance(importance: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&importance) {
        return Err(MemoryError::Validation(format!(
            "importance must be within [0, 1], got {importance}"
        )));
    }
    Ok(())
}
