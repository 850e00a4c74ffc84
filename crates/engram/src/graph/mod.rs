//! Concept-linked knowledge graph
//!
//! Nodes are derived from memory entries and live in a flat map keyed by node
//! id; edges are stored on both endpoints as id sets. Two nodes are linked when
//! their contents share at least one extracted concept.

pub mod concepts;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::memory::types::MemoryEntry;

/// Graph node id for a memory entry
pub fn node_id(entry_id: Uuid) -> String {
    format!("memory_{entry_id}")
}

/// Attributes copied from the source entry at build time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeProperties {
    pub importance: f64,
    pub timestamp: DateTime<Utc>,
    pub concepts: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A graph vertex derived from one memory entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeNode {
    pub id: String,
    pub content: String,
    /// The source entry's memory type tag
    pub node_type: String,
    pub properties: NodeProperties,
    /// Ids of nodes sharing at least one concept with this one
    pub connections: BTreeSet<String>,
    /// Source entry importance when the graph was built
    pub strength: f64,
}

impl KnowledgeNode {
    pub fn from_entry(entry: &MemoryEntry) -> Self {
        Self {
            id: node_id(entry.id),
            content: entry.content.clone(),
            node_type: entry.memory_type.as_str().to_string(),
            properties: NodeProperties {
                importance: entry.importance,
                timestamp: entry.timestamp,
                concepts: concepts::extract(&entry.content),
                tags: entry.tags.clone(),
            },
            connections: BTreeSet::new(),
            strength: entry.importance,
        }
    }
}

/// Build nodes for `entries` and link every pair that shares a concept.
///
/// Only direct co-occurrence creates an edge; a repeated entry yields a single
/// node.
pub fn build<'a, I>(entries: I) -> BTreeMap<String, KnowledgeNode>
where
    I: IntoIterator<Item = &'a MemoryEntry>,
{
    let mut nodes: BTreeMap<String, KnowledgeNode> = BTreeMap::new();
    for entry in entries {
        let node = KnowledgeNode::from_entry(entry);
        nodes.entry(node.id.clone()).or_insert(node);
    }

    let mut by_concept: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for node in nodes.values() {
        for concept in &node.properties.concepts {
            by_concept
                .entry(concept.as_str())
                .or_default()
                .push(node.id.as_str());
        }
    }

    let mut edges: Vec<(String, String)> = Vec::new();
    for members in by_concept.values().filter(|m| m.len() > 1) {
        for (i, a) in members.iter().enumerate() {
            for b in &members[i + 1..] {
                edges.push((a.to_string(), b.to_string()));
            }
        }
    }

    for (a, b) in edges {
        if let Some(node) = nodes.get_mut(&a) {
            node.connections.insert(b.clone());
        }
        if let Some(node) = nodes.get_mut(&b) {
            node.connections.insert(a);
        }
    }

    nodes
}

/// Number of undirected edges in a node map
pub fn edge_count(nodes: &BTreeMap<String, KnowledgeNode>) -> usize {
    nodes.values().map(|n| n.connections.len()).sum::<usize>() / 2
}

/// Result of a graph build
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeGraph {
    pub graph_id: Uuid,
    pub topic: String,
    /// Number of nodes
    pub nodes: usize,
    /// Number of undirected edges
    pub connections: usize,
    pub node_map: BTreeMap<String, KnowledgeNode>,
}

impl KnowledgeGraph {
    pub fn new(topic: impl Into<String>, node_map: BTreeMap<String, KnowledgeNode>) -> Self {
        Self {
            graph_id: Uuid::new_v4(),
            topic: topic.into(),
            nodes: node_map.len(),
            connections: edge_count(&node_map),
            node_map,
        }
    }
}
