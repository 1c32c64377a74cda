use crate::knowledge::KnowledgeItem;
use serde::{Deserialize, Serialize};

/// Default similarity cutoff for a graph edge.
pub const DEFAULT_LINK_THRESHOLD: f32 = 0.7;

/// An undirected edge between two related items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeLink {
    /// Id of one endpoint.
    pub source: String,
    /// Id of the other endpoint.
    pub target: String,
    /// Cosine similarity of the two embeddings.
    pub value: f32,
}

/// A graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Item id.
    pub id: String,
    /// Item name.
    pub name: String,
}

/// Items and their similarity edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    /// One node per input item.
    pub nodes: Vec<GraphNode>,
    /// Edges at or above the threshold.
    pub links: Vec<KnowledgeLink>,
}

/// Cosine of the angle between `a` and `b`; 0 for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// Edges between every pair of items whose embeddings have cosine
/// similarity at or above `threshold`. Items without an embedding, or with
/// a different dimension, never link. Output order follows input order.
pub fn link_related(items: &[KnowledgeItem], threshold: f32) -> Vec<KnowledgeLink> {
    let mut links = Vec::new();
    for (i, a) in items.iter().enumerate() {
        let Some(ea) = a.embedding.as_deref().filter(|e| !e.is_empty()) else {
            continue;
        };
        for b in &items[i + 1..] {
            let Some(eb) = b.embedding.as_deref() else {
                continue;
            };
            if ea.len() != eb.len() {
                continue;
            }
            let value = cosine_similarity(ea, eb);
            if value >= threshold {
                links.push(KnowledgeLink {
                    source: a.id.clone(),
                    target: b.id.clone(),
                    value,
                });
            }
        }
    }
    links
}

/// Nodes for every item plus [`link_related`] edges.
pub fn build_graph(items: &[KnowledgeItem], threshold: f32) -> KnowledgeGraph {
    KnowledgeGraph {
        nodes: items
            .iter()
            .map(|item| GraphNode {
                id: item.id.clone(),
                name: item.name.clone(),
            })
            .collect(),
        links: link_related(items, threshold),
    }
}
