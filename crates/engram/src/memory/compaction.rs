//! Capacity-bounded compaction
//!
//! Decides which cached entries survive when the store is shrunk to a target
//! size. Planning is pure; the manager applies the plan to the record store,
//! the cache and the similarity index.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::memory::types::MemoryEntry;

/// Why a compaction pass was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionTrigger {
    /// The cache grew past the configured maximum
    Capacity,
    /// The configured interval elapsed since the last pass
    Interval,
}

/// Decide whether a store should be followed by a compaction pass.
///
/// Capacity wins over the interval when both apply.
pub fn should_compact(
    cached: usize,
    max_entries: usize,
    last_compaction: DateTime<Utc>,
    interval_secs: u64,
    now: DateTime<Utc>,
) -> Option<CompactionTrigger> {
    if cached > max_entries {
        return Some(CompactionTrigger::Capacity);
    }
    let elapsed_ms = (now - last_compaction).num_milliseconds();
    if elapsed_ms > 0 && elapsed_ms as u64 > interval_secs.saturating_mul(1000) {
        return Some(CompactionTrigger::Interval);
    }
    None
}

/// Survival order: importance descending, then newest first.
///
/// The id breaks exact ties so the plan never depends on hash-map iteration
/// order.
pub fn survival_order(a: &MemoryEntry, b: &MemoryEntry) -> Ordering {
    b.importance
        .total_cmp(&a.importance)
        .then_with(|| b.timestamp.cmp(&a.timestamp))
        .then_with(|| a.id.cmp(&b.id))
}

/// Split of the cache into survivors and evictees
#[derive(Debug, Clone, Default)]
pub struct CompactionPlan {
    /// Kept ids, best first
    pub keep: Vec<Uuid>,
    /// Evicted ids, best first
    pub evict: Vec<Uuid>,
}

impl CompactionPlan {
    /// Rank `entries` and keep the first `target_size`.
    pub fn new<'a, I>(entries: I, target_size: usize) -> Self
    where
        I: IntoIterator<Item = &'a MemoryEntry>,
    {
        let mut ranked: Vec<&MemoryEntry> = entries.into_iter().collect();
        if ranked.len() <= target_size {
            return Self {
                keep: ranked.iter().map(|e| e.id).collect(),
                evict: Vec::new(),
            };
        }

        ranked.sort_by(|a, b| survival_order(a, b));
        let evict = ranked.split_off(target_size);

        Self {
            keep: ranked.iter().map(|e| e.id).collect(),
            evict: evict.iter().map(|e| e.id).collect(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.evict.is_empty()
    }
}

/// Outcome of a compaction pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompactionReport {
    /// Cached entries before the pass
    pub original_size: usize,
    /// Cached entries after the pass
    pub new_size: usize,
    /// `original_size - new_size`
    pub removed: usize,
    /// `removed / original_size`, 0 for an empty store
    pub ratio: f64,
    pub evicted_ids: Vec<Uuid>,
}

impl CompactionReport {
    pub fn new(original_size: usize, evicted_ids: Vec<Uuid>) -> Self {
        let removed = evicted_ids.len();
        let ratio = if original_size == 0 {
            0.0
        } else {
            removed as f64 / original_size as f64
        };
        Self {
            original_size,
            new_size: original_size - removed,
            removed,
            ratio,
            evicted_ids,
        }
    }

    /// Report for a pass that removed nothing
    pub fn unchanged(size: usize) -> Self {
        Self::new(size, Vec::new())
    }
}
