use crate::config::SearchSettings;
use crate::knowledge::{knowledge_search, HttpKnowledgeBase, KnowledgeBase, KNOWLEDGE_SOURCE};
use crate::types::{SearchQuery, SearchResult, SearchSource, WebEngine};
use crate::web::{backend_for, WebSearchBackend};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskloom_core::{TaskloomError, TaskloomResult};
use tracing::{debug, info, warn};

/// Merges web and knowledge-base results for a query.
///
/// - `web`: exactly one engine call.
/// - `knowledge`: one similarity search capped at the knowledge limit.
/// - `both`: the two calls run concurrently; web results come first, then
///   knowledge results, each in its own relevance order. There is no
///   cross-source re-ranking or deduplication.
///
/// Every backend call is bounded by the configured timeout. Nothing is
/// retried.
pub struct RetrievalFusion {
    web: HashMap<WebEngine, Arc<dyn WebSearchBackend>>,
    knowledge: Option<Arc<dyn KnowledgeBase>>,
    knowledge_limit: usize,
    timeout: Duration,
}

impl RetrievalFusion {
    /// Fusion with no backends wired; add them with the `with_*` builders.
    pub fn new() -> Self {
        Self {
            web: HashMap::new(),
            knowledge: None,
            knowledge_limit: 5,
            timeout: Duration::from_secs(30),
        }
    }

    /// Wire every engine and the knowledge endpoint from `[search]` settings.
    pub fn from_settings(settings: &SearchSettings, http: reqwest::Client) -> Self {
        let mut fusion = Self::new()
            .with_knowledge_limit(settings.knowledge_limit)
            .with_timeout(settings.timeout());
        for engine in WebEngine::ALL {
            fusion = fusion.with_web_backend(backend_for(
                engine,
                settings.engine(engine).clone(),
                http.clone(),
            ));
        }
        if let Some(endpoint) = settings.knowledge_endpoint.as_deref() {
            fusion = fusion
                .with_knowledge_base(Arc::new(HttpKnowledgeBase::new(endpoint, http.clone())));
        }
        fusion
    }

    /// Register (or replace) the adapter for its engine.
    pub fn with_web_backend(mut self, backend: Arc<dyn WebSearchBackend>) -> Self {
        self.web.insert(backend.engine(), backend);
        self
    }

    /// Search `kb` for the knowledge branch.
    pub fn with_knowledge_base(mut self, kb: Arc<dyn KnowledgeBase>) -> Self {
        self.knowledge = Some(kb);
        self
    }

    /// Cap on knowledge results per search.
    pub fn with_knowledge_limit(mut self, limit: usize) -> Self {
        self.knowledge_limit = limit;
        self
    }

    /// Bound each backend call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `search(query, source, engine)`.
    pub async fn search(
        &self,
        query: &str,
        source: SearchSource,
        engine: WebEngine,
    ) -> TaskloomResult<Vec<SearchResult>> {
        let start = Instant::now();
        let results = match source {
            SearchSource::Web => self.web_search(query, engine).await?,
            SearchSource::Knowledge => self.knowledge_search(query).await?,
            SearchSource::Both => {
                let (web, knowledge) =
                    tokio::join!(self.web_search(query, engine), self.knowledge_search(query));
                let mut results = web?;
                results.extend(knowledge?);
                results
            }
        };

        info!(
            %source,
            %engine,
            results = results.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Search completed"
        );
        Ok(results)
    }

    /// [`search`](Self::search) taking a [`SearchQuery`].
    pub async fn search_query(&self, query: &SearchQuery) -> TaskloomResult<Vec<SearchResult>> {
        self.search(&query.query, query.source, query.engine).await
    }

    async fn web_search(&self, query: &str, engine: WebEngine) -> TaskloomResult<Vec<SearchResult>> {
        let backend = self.web.get(&engine).ok_or_else(|| {
            TaskloomError::search_backend(engine.as_str(), "engine is not configured")
        })?;
        bounded(engine.as_str(), self.timeout, backend.search(query)).await
    }

    async fn knowledge_search(&self, query: &str) -> TaskloomResult<Vec<SearchResult>> {
        let Some(kb) = &self.knowledge else {
            debug!("No knowledge base configured, returning no knowledge results");
            return Ok(Vec::new());
        };
        bounded(
            KNOWLEDGE_SOURCE,
            self.timeout,
            knowledge_search(kb.as_ref(), query, self.knowledge_limit),
        )
        .await
    }
}

impl Default for RetrievalFusion {
    fn default() -> Self {
        Self::new()
    }
}

async fn bounded<T>(
    engine: &str,
    timeout: Duration,
    fut: impl Future<Output = TaskloomResult<T>>,
) -> TaskloomResult<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            warn!(engine, error = %e, "Search backend failed");
            Err(e)
        }
        Err(_) => {
            warn!(engine, timeout_ms = timeout.as_millis() as u64, "Search backend timed out");
            Err(TaskloomError::search_backend(
                engine,
                format!("request timed out after {}ms", timeout.as_millis()),
            ))
        }
    }
}
