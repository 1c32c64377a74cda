use super::{base_url, fetch_json, parse_organic, require_key, WebSearchBackend};
use crate::config::EngineConfig;
use crate::types::{SearchResult, WebEngine};
use async_trait::async_trait;
use taskloom_core::TaskloomResult;

const DEFAULT_BASE: &str = "https://serpapi.com";

/// SerpApi: `GET /search?q=&api_key=`, hits in `organic_results[].link`.
pub struct SerpApiBackend {
    config: EngineConfig,
    http: reqwest::Client,
}

impl SerpApiBackend {
    /// Adapter for `config`, sharing `http`.
    pub fn new(config: EngineConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }
}

#[async_trait]
impl WebSearchBackend for SerpApiBackend {
    fn engine(&self) -> WebEngine {
        WebEngine::SerpApi
    }

    async fn search(&self, query: &str) -> TaskloomResult<Vec<SearchResult>> {
        let key = require_key(self.engine(), &self.config)?;
        let url = format!("{}/search", base_url(&self.config, DEFAULT_BASE));
        let request = self
            .http
            .get(&url)
            .query(&[("q", query), ("api_key", key.as_str())]);

        let body = fetch_json(self.engine(), request).await?;
        Ok(parse_organic(self.engine(), &body, "organic_results", &["link"]))
    }
}
