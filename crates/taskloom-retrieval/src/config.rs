use crate::types::WebEngine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_knowledge_limit() -> usize {
    5
}

fn default_timeout_secs() -> u64 {
    30
}

/// Credentials and API root for one web engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Credential; falls back to the engine's env var when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// API root; the engine's default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl EngineConfig {
    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Override the API root.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// The key, if set and not blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

/// `[search]` configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    /// SerpApi settings.
    #[serde(default)]
    pub serpapi: EngineConfig,
    /// Serper settings.
    #[serde(default)]
    pub serper: EngineConfig,
    /// SearchApi settings.
    #[serde(default)]
    pub searchapi: EngineConfig,
    /// Similarity-search endpoint of the document store.
    #[serde(default)]
    pub knowledge_endpoint: Option<String>,
    /// Result cap for knowledge-base searches.
    #[serde(default = "default_knowledge_limit")]
    pub knowledge_limit: usize,
    /// Bound on every backend call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            serpapi: EngineConfig::default(),
            serper: EngineConfig::default(),
            searchapi: EngineConfig::default(),
            knowledge_endpoint: None,
            knowledge_limit: default_knowledge_limit(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl SearchSettings {
    /// Settings of `engine`.
    pub fn engine(&self, engine: WebEngine) -> &EngineConfig {
        match engine {
            WebEngine::SerpApi => &self.serpapi,
            WebEngine::Serper => &self.serper,
            WebEngine::SearchApi => &self.searchapi,
        }
    }

    /// Mutable settings of `engine`.
    pub fn engine_mut(&mut self, engine: WebEngine) -> &mut EngineConfig {
        match engine {
            WebEngine::SerpApi => &mut self.serpapi,
            WebEngine::Serper => &mut self.serper,
            WebEngine::SearchApi => &mut self.searchapi,
        }
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Fill missing engine keys from `SERPAPI_KEY`, `SERPER_KEY`, `SEARCHAPI_KEY`.
    pub fn fill_keys_from_env(&mut self) {
        for engine in WebEngine::ALL {
            let var = match engine {
                WebEngine::SerpApi => "SERPAPI_KEY",
                WebEngine::Serper => "SERPER_KEY",
                WebEngine::SearchApi => "SEARCHAPI_KEY",
            };
            let config = self.engine_mut(engine);
            if config.api_key().is_none() {
                if let Ok(key) = std::env::var(var) {
                    config.api_key = Some(key);
                }
            }
        }
    }
}
