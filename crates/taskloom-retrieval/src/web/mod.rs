/// SearchApi adapter.
pub mod searchapi;
/// SerpApi adapter.
pub mod serpapi;
/// Serper adapter.
pub mod serper;

pub use searchapi::SearchApiBackend;
pub use serpapi::SerpApiBackend;
pub use serper::SerperBackend;

use crate::config::EngineConfig;
use crate::types::{SearchResult, WebEngine};
use async_trait::async_trait;
use std::sync::Arc;
use taskloom_core::{TaskloomError, TaskloomResult};

/// A web search engine adapter.
///
/// Each adapter normalizes its engine's JSON into [`SearchResult`]s tagged
/// with the engine name, and fails with `SearchBackend` on any non-success
/// status.
#[async_trait]
pub trait WebSearchBackend: Send + Sync {
    /// Engine this adapter talks to.
    fn engine(&self) -> WebEngine;

    /// Results for `query`, in the engine's order.
    async fn search(&self, query: &str) -> TaskloomResult<Vec<SearchResult>>;
}

/// Build the adapter for `engine`.
pub fn backend_for(
    engine: WebEngine,
    config: EngineConfig,
    http: reqwest::Client,
) -> Arc<dyn WebSearchBackend> {
    match engine {
        WebEngine::SerpApi => Arc::new(SerpApiBackend::new(config, http)),
        WebEngine::Serper => Arc::new(SerperBackend::new(config, http)),
        WebEngine::SearchApi => Arc::new(SearchApiBackend::new(config, http)),
    }
}

pub(crate) fn require_key(engine: WebEngine, config: &EngineConfig) -> TaskloomResult<String> {
    config
        .api_key()
        .map(str::to_string)
        .ok_or_else(|| TaskloomError::search_backend(engine.as_str(), "no API key configured"))
}

pub(crate) fn base_url(config: &EngineConfig, default: &str) -> String {
    config
        .base_url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}

/// Send the request and decode JSON, mapping failures to `SearchBackend`.
pub(crate) async fn fetch_json(
    engine: WebEngine,
    request: reqwest::RequestBuilder,
) -> TaskloomResult<serde_json::Value> {
    let tag = engine.as_str();
    let resp = request
        .send()
        .await
        .map_err(|e| TaskloomError::search_backend(tag, e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let excerpt: String = body.chars().take(300).collect();
        return Err(TaskloomError::search_backend(
            tag,
            format!("HTTP {status}: {excerpt}"),
        ));
    }

    resp.json()
        .await
        .map_err(|e| TaskloomError::search_backend(tag, format!("invalid JSON body: {e}")))
}

/// Map `body[array_key][*]` to results. The first present key of `url_keys`
/// supplies the URL. A missing array yields no results.
pub(crate) fn parse_organic(
    engine: WebEngine,
    body: &serde_json::Value,
    array_key: &str,
    url_keys: &[&str],
) -> Vec<SearchResult> {
    let Some(items) = body.get(array_key).and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    let text = |item: &serde_json::Value, key: &str| {
        item.get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    items
        .iter()
        .map(|item| SearchResult {
            title: text(item, "title"),
            url: url_keys
                .iter()
                .find_map(|key| item.get(*key).and_then(|v| v.as_str()))
                .unwrap_or_default()
                .to_string(),
            snippet: text(item, "snippet"),
            source: engine.as_str().to_string(),
        })
        .collect()
}
