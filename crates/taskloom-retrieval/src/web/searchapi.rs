use super::{base_url, fetch_json, parse_organic, require_key, WebSearchBackend};
use crate::config::EngineConfig;
use crate::types::{SearchResult, WebEngine};
use async_trait::async_trait;
use taskloom_core::TaskloomResult;

const DEFAULT_BASE: &str = "https://www.searchapi.io";

/// SearchApi: `GET /api/v1/search?q=&api_key=`, hits in `organic_results[]`
/// with the URL under `link` or `url`.
pub struct SearchApiBackend {
    config: EngineConfig,
    http: reqwest::Client,
}

impl SearchApiBackend {
    /// Adapter for `config`, sharing `http`.
    pub fn new(config: EngineConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }
}

#[async_trait]
impl WebSearchBackend for SearchApiBackend {
    fn engine(&self) -> WebEngine {
        WebEngine::SearchApi
    }

    async fn search(&self, query: &str) -> TaskloomResult<Vec<SearchResult>> {
        let key = require_key(self.engine(), &self.config)?;
        let url = format!("{}/api/v1/search", base_url(&self.config, DEFAULT_BASE));
        let request = self
            .http
            .get(&url)
            .query(&[("q", query), ("api_key", key.as_str())]);

        let body = fetch_json(self.engine(), request).await?;
        Ok(parse_organic(
            self.engine(),
            &body,
            "organic_results",
            &["link", "url"],
        ))
    }
}
