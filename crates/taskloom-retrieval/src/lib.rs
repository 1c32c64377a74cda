//! Retrieval fusion for the taskloom engine.
//!
//! Normalizes hits from three web search engines and a knowledge-base
//! similarity endpoint into [`SearchResult`]s and merges them per the
//! requested [`SearchSource`]. Also builds knowledge-graph edges from real
//! embedding similarity.

/// `[search]` settings.
pub mod config;
/// The fusion entry point.
pub mod fusion;
/// Knowledge-base client and item model.
pub mod knowledge;
/// Similarity edges between knowledge items.
pub mod links;
/// Query and result types.
pub mod types;
/// Web search engine adapters.
pub mod web;

pub use config::{EngineConfig, SearchSettings};
pub use fusion::RetrievalFusion;
pub use knowledge::{
    knowledge_search, HttpKnowledgeBase, InMemoryKnowledgeBase, KnowledgeBase, KnowledgeItem,
    KnowledgeStatus,
};
pub use links::{
    build_graph, cosine_similarity, link_related, KnowledgeGraph, KnowledgeLink,
    DEFAULT_LINK_THRESHOLD,
};
pub use types::{SearchQuery, SearchResult, SearchSource, WebEngine};
pub use web::WebSearchBackend;
