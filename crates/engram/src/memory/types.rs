//! Memory types for the Engram system
//!
//! Defines the stored entry, the request shapes accepted by the manager and
//! the result/summary types it hands back.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{MemoryError, Result};

/// Open key/value map attached to every entry
pub type Metadata = serde_json::Map<String, Value>;

/// Metadata key stamped with the creation time
pub const META_CREATED: &str = "created";
/// Metadata key counting how often search returned the entry
pub const META_ACCESS_COUNT: &str = "access_count";
/// Metadata key holding the last time search returned the entry
pub const META_LAST_ACCESSED: &str = "last_accessed";

/// Category tag of a memory. The set is open: any tag that is not exactly
/// one of the lowercase known names is kept verbatim in [`MemoryType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MemoryType {
    Fact,
    Conversation,
    Task,
    Knowledge,
    Experience,
    Other(String),
}

impl MemoryType {
    pub fn as_str(&self) -> &str {
        match self {
            MemoryType::Fact => "fact",
            MemoryType::Conversation => "conversation",
            MemoryType::Task => "task",
            MemoryType::Knowledge => "knowledge",
            MemoryType::Experience => "experience",
            MemoryType::Other(tag) => tag,
        }
    }
}

impl From<&str> for MemoryType {
    fn from(tag: &str) -> Self {
        match tag {
            "fact" => MemoryType::Fact,
            "conversation" => MemoryType::Conversation,
            "task" => MemoryType::Task,
            "knowledge" => MemoryType::Knowledge,
            "experience" => MemoryType::Experience,
            _ => MemoryType::Other(tag.to_string()),
        }
    }
}

impl From<String> for MemoryType {
    fn from(tag: String) -> Self {
        MemoryType::from(tag.as_str())
    }
}

impl From<MemoryType> for String {
    fn from(memory_type: MemoryType) -> Self {
        memory_type.as_str().to_string()
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single unit of remembered content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique identifier, assigned at creation
    pub id: Uuid,
    /// The remembered text
    pub content: String,
    /// Category tag, affects importance weighting
    pub memory_type: MemoryType,
    /// Survival priority in `[0.0, 1.0]`
    pub importance: f64,
    /// When this entry was created
    pub timestamp: DateTime<Utc>,
    /// Caller metadata plus access bookkeeping
    pub metadata: Metadata,
    /// Embedding produced once at creation; absent only for persisted
    /// records whose vector could not be restored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Free-form labels
    pub tags: Vec<String>,
}

impl MemoryEntry {
    /// Create a new entry stamped with a fresh id and the current time
    pub fn new(
        content: String,
        memory_type: MemoryType,
        importance: f64,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            content,
            memory_type,
            importance,
            timestamp: Utc::now(),
            metadata: Metadata::new(),
            embedding: Some(embedding),
            tags: Vec::new(),
        }
    }

    /// Number of times search has returned this entry
    pub fn access_count(&self) -> u64 {
        self.metadata
            .get(META_ACCESS_COUNT)
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }

    /// Record a retrieval: bump the access counter and refresh the timestamp
    pub fn mark_accessed(&mut self) {
        let count = self.access_count() + 1;
        self.metadata
            .insert(META_ACCESS_COUNT.to_string(), Value::from(count));
        self.metadata.insert(
            META_LAST_ACCESSED.to_string(),
            Value::from(Utc::now().to_rfc3339()),
        );
    }

    /// Which stats band this entry's importance falls into
    pub fn importance_band(&self) -> ImportanceBand {
        ImportanceBand::of(self.importance)
    }
}

/// Parameters for storing a new memory.
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub content: String,
    pub memory_type: MemoryType,
    pub metadata: Option<Metadata>,
    pub tags: Vec<String>,
    /// Explicit importance; computed by the scorer when `None`
    pub importance: Option<f64>,
}

impl NewMemory {
    pub fn new(content: impl Into<String>, memory_type: impl Into<MemoryType>) -> Self {
        Self {
            content: content.into(),
            memory_type: memory_type.into(),
            metadata: None,
            tags: Vec::new(),
            importance: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = Some(importance);
        self
    }
}

/// Inclusive creation-time window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(MemoryError::Validation(format!(
                "time range start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

/// A similarity search request.
///
/// `limit` and `min_similarity` fall back to the manager's configured
/// defaults (10 and 0.3 out of the box) when left unset.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub query: String,
    /// Restrict to these types (any of)
    pub memory_types: Option<Vec<MemoryType>>,
    pub limit: Option<usize>,
    pub min_similarity: Option<f32>,
    pub time_range: Option<TimeRange>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            memory_types: None,
            limit: None,
            min_similarity: None,
            time_range: None,
        }
    }

    pub fn with_memory_types(mut self, types: Vec<MemoryType>) -> Self {
        self.memory_types = Some(types);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = Some(min_similarity);
        self
    }

    pub fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = Some(time_range);
        self
    }
}

/// A ranked search hit
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub entry: MemoryEntry,
    /// Cosine similarity between the query and the entry
    pub similarity_score: f32,
    /// 1-based position in the returned list
    pub rank: usize,
}

/// Importance histogram band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportanceBand {
    /// importance > 0.7
    High,
    /// 0.4 < importance <= 0.7
    Medium,
    Low,
}

impl ImportanceBand {
    pub fn of(importance: f64) -> Self {
        if importance > 0.7 {
            ImportanceBand::High
        } else if importance > 0.4 {
            ImportanceBand::Medium
        } else {
            ImportanceBand::Low
        }
    }
}

/// Counts per importance band
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportanceBands {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl ImportanceBands {
    pub fn record(&mut self, importance: f64) {
        match ImportanceBand::of(importance) {
            ImportanceBand::High => self.high += 1,
            ImportanceBand::Medium => self.medium += 1,
            ImportanceBand::Low => self.low += 1,
        }
    }
}

/// Summary returned by `get_memory_stats`
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub total: usize,
    pub knowledge_graph_nodes: usize,
    pub by_type: BTreeMap<String, usize>,
    pub importance_bands: ImportanceBands,
    pub avg_importance: f64,
    pub index_size: usize,
    pub last_compaction: DateTime<Utc>,
}
