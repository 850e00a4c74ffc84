//! Engram - capacity-bounded semantic memory
//!
//! Stores short texts with an embedding and an importance score, answers
//! similarity queries, evicts the least important entries when over capacity,
//! and links entries that share concepts into a knowledge graph.

pub mod config;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod index;
pub mod memory;
pub mod storage;
pub mod testing;

pub use config::Config;
pub use error::{MemoryError, Result};
pub use graph::{KnowledgeGraph, KnowledgeNode};
pub use memory::{
    CompactionReport, MemoryEntry, MemoryManager, MemoryStats, MemoryType, NewMemory, SearchQuery,
    SearchResult, TimeRange,
};
