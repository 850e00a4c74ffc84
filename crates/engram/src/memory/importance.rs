//! Importance scoring for new memories
//!
//! The score decides which entries survive compaction. It is a pure function
//! of the content, the type tag and the caller metadata:
//!
//! ```text
//! score = clamp(0.5 * type * length * priority * source * frequency, 0, 1)
//! ```
//!
//! Factors are applied in exactly that order so that the result is
//! reproducible bit-for-bit.

use serde_json::Value;

use crate::memory::types::{Metadata, MemoryType};

/// Metadata key holding a `"high"`/`"low"` priority hint
pub const META_PRIORITY: &str = "priority";
/// Metadata key naming where the content came from
pub const META_SOURCE: &str = "source";
/// Metadata key counting how often the content was mentioned
pub const META_FREQUENCY: &str = "frequency";

const BASE_IMPORTANCE: f64 = 0.5;
const LENGTH_NORMALIZER: f64 = 500.0;
const MAX_LENGTH_FACTOR: f64 = 2.0;
const MAX_FREQUENCY_FACTOR: f64 = 2.0;

/// Per-type weighting coefficient
pub fn type_coefficient(memory_type: &MemoryType) -> f64 {
    match memory_type {
        MemoryType::Task | MemoryType::Knowledge => 0.9,
        MemoryType::Fact => 0.8,
        MemoryType::Experience => 0.7,
        MemoryType::Conversation => 0.6,
        MemoryType::Other(_) => 0.5,
    }
}

/// Compute the importance of a memory in `[0.0, 1.0]`.
pub fn score(content: &str, memory_type: &MemoryType, metadata: &Metadata) -> f64 {
    let mut importance = BASE_IMPORTANCE;

    importance *= type_coefficient(memory_type);

    // Longer content weighs more, capped at 2x
    let length_factor = (content.chars().count() as f64 / LENGTH_NORMALIZER).min(MAX_LENGTH_FACTOR);
    importance *= 0.5 + length_factor * 0.5;

    match metadata.get(META_PRIORITY).and_then(Value::as_str) {
        Some("high") => importance *= 1.5,
        Some("low") => importance *= 0.7,
        _ => {}
    }

    if metadata.get(META_SOURCE).and_then(Value::as_str) == Some("user") {
        importance *= 1.2;
    }

    let frequency = metadata
        .get(META_FREQUENCY)
        .and_then(Value::as_f64)
        .unwrap_or(1.0);
    importance *= (1.0 + (frequency - 1.0) * 0.1).min(MAX_FREQUENCY_FACTOR);

    importance.clamp(0.0, 1.0)
}
