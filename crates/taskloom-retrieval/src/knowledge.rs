use crate::types::SearchResult;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use taskloom_core::{TaskloomError, TaskloomResult};
use tracing::debug;

/// Engine tag for knowledge-base results and errors.
pub const KNOWLEDGE_SOURCE: &str = "knowledge";

/// Ingestion state of a knowledge item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeStatus {
    /// Still being ingested.
    Processing,
    /// Searchable.
    Ready,
    /// Ingestion failed.
    Error,
}

/// A document as produced by the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    /// Document identifier.
    pub id: String,
    /// Document name, used as the result title.
    pub name: String,
    /// Ingestion state; only `ready` items are searchable.
    pub status: KnowledgeStatus,
    /// Vector used for similarity links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Short description, used as the result snippet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Free-form labels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl KnowledgeItem {
    /// A `ready` item with no embedding, summary or tags.
    pub fn ready(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: KnowledgeStatus::Ready,
            embedding: None,
            summary: None,
            tags: None,
        }
    }

    /// Set the summary.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Set the tags.
    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = Some(tags.iter().map(|t| t.to_string()).collect());
        self
    }

    /// Set the embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Stable internal URI for this item.
    pub fn uri(&self) -> String {
        format!("knowledge://{}", self.id)
    }

    /// Normalize into a [`SearchResult`] tagged `knowledge`.
    pub fn to_search_result(&self) -> SearchResult {
        let snippet = match (&self.summary, &self.tags) {
            (Some(summary), _) if !summary.is_empty() => summary.clone(),
            (_, Some(tags)) => tags.join(", "),
            _ => String::new(),
        };
        SearchResult {
            title: self.name.clone(),
            url: self.uri(),
            snippet,
            source: KNOWLEDGE_SOURCE.to_string(),
        }
    }
}

/// Similarity search over the document store.
///
/// The engine never computes embeddings itself; ranking is the store's job
/// and results come back in its relevance order.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// Up to `limit` items most similar to `query`, best first.
    async fn similar(&self, query: &str, limit: usize) -> TaskloomResult<Vec<KnowledgeItem>>;
}

/// Client for an HTTP similarity-search endpoint.
///
/// Posts `{query, limit}` and accepts either a bare array of items or an
/// object with an `items` array.
pub struct HttpKnowledgeBase {
    endpoint: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SimilarResponse {
    Bare(Vec<KnowledgeItem>),
    Wrapped { items: Vec<KnowledgeItem> },
}

impl HttpKnowledgeBase {
    /// Client posting `{query, limit}` to `endpoint`.
    pub fn new(endpoint: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            endpoint: endpoint.into(),
            http,
        }
    }
}

#[async_trait]
impl KnowledgeBase for HttpKnowledgeBase {
    async fn similar(&self, query: &str, limit: usize) -> TaskloomResult<Vec<KnowledgeItem>> {
        let resp = self
            .http
            .post(&self.endpoint)
            .json(&serde_json::json!({ "query": query, "limit": limit }))
            .send()
            .await
            .map_err(|e| TaskloomError::search_backend(KNOWLEDGE_SOURCE, e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TaskloomError::search_backend(
                KNOWLEDGE_SOURCE,
                format!("HTTP {status}"),
            ));
        }

        let body: SimilarResponse = resp.json().await.map_err(|e| {
            TaskloomError::search_backend(KNOWLEDGE_SOURCE, format!("invalid JSON body: {e}"))
        })?;
        let items = match body {
            SimilarResponse::Bare(items) | SimilarResponse::Wrapped { items } => items,
        };
        debug!(count = items.len(), "Knowledge base returned items");
        Ok(items)
    }
}

/// Fixed in-process item list, matched by keyword.
///
/// For local runs without a document store and for tests.
#[derive(Default)]
pub struct InMemoryKnowledgeBase {
    items: RwLock<Vec<KnowledgeItem>>,
}

impl InMemoryKnowledgeBase {
    /// Base holding `items`.
    pub fn new(items: Vec<KnowledgeItem>) -> Self {
        Self {
            items: RwLock::new(items),
        }
    }

    /// Add an item.
    pub fn insert(&self, item: KnowledgeItem) {
        self.items.write().push(item);
    }
}

#[async_trait]
impl KnowledgeBase for InMemoryKnowledgeBase {
    async fn similar(&self, query: &str, limit: usize) -> TaskloomResult<Vec<KnowledgeItem>> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();

        let items = self.items.read();
        Ok(items
            .iter()
            .filter(|item| {
                let haystack = format!(
                    "{} {} {}",
                    item.name,
                    item.summary.as_deref().unwrap_or_default(),
                    item.tags.as_deref().unwrap_or_default().join(" ")
                )
                .to_lowercase();
                terms.is_empty() || terms.iter().any(|t| haystack.contains(t.as_str()))
            })
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Search `kb` and normalize `ready` hits, capped at `limit`.
pub async fn knowledge_search(
    kb: &dyn KnowledgeBase,
    query: &str,
    limit: usize,
) -> TaskloomResult<Vec<SearchResult>> {
    let items = kb.similar(query, limit).await?;
    Ok(items
        .iter()
        .filter(|item| item.status == KnowledgeStatus::Ready)
        .take(limit)
        .map(KnowledgeItem::to_search_result)
        .collect())
}
