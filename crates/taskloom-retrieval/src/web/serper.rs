use super::{base_url, fetch_json, parse_organic, require_key, WebSearchBackend};
use crate::config::EngineConfig;
use crate::types::{SearchResult, WebEngine};
use async_trait::async_trait;
use taskloom_core::TaskloomResult;

const DEFAULT_BASE: &str = "https://api.serper.dev";

/// Serper: `POST /search` with `X-API-KEY`, hits in `organic[].link`.
pub struct SerperBackend {
    config: EngineConfig,
    http: reqwest::Client,
}

impl SerperBackend {
    /// Adapter for `config`, sharing `http`.
    pub fn new(config: EngineConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }
}

#[async_trait]
impl WebSearchBackend for SerperBackend {
    fn engine(&self) -> WebEngine {
        WebEngine::Serper
    }

    async fn search(&self, query: &str) -> TaskloomResult<Vec<SearchResult>> {
        let key = require_key(self.engine(), &self.config)?;
        let url = format!("{}/search", base_url(&self.config, DEFAULT_BASE));
        let request = self
            .http
            .post(&url)
            .header("X-API-KEY", key)
            .json(&serde_json::json!({ "q": query }));

        let body = fetch_json(self.engine(), request).await?;
        Ok(parse_organic(self.engine(), &body, "organic", &["link"]))
    }
}
