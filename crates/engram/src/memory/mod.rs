//! Memory entries and the operations over them
//!
//! [`MemoryManager`] is the entry point; the other modules hold the entry
//! types, the importance scorer and the compaction planner it builds on.

pub mod compaction;
pub mod importance;
pub mod manager;
pub mod types;

pub use compaction::{CompactionPlan, CompactionReport, CompactionTrigger};
pub use manager::MemoryManager;
pub use types::{
    ImportanceBand, ImportanceBands, MemoryEntry, MemoryStats, MemoryType, Metadata, NewMemory,
    SearchQuery, SearchResult, TimeRange,
};
