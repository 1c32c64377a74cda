use serde::{Deserialize, Serialize};
use std::str::FromStr;
use taskloom_core::TaskloomError;

/// Which backends a search consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSource {
    /// One web engine.
    #[default]
    Web,
    /// The knowledge-base similarity search.
    Knowledge,
    /// Web first, then knowledge base.
    Both,
}

impl SearchSource {
    /// `web` or `both`.
    pub fn includes_web(&self) -> bool {
        matches!(self, SearchSource::Web | SearchSource::Both)
    }

    /// `knowledge` or `both`.
    pub fn includes_knowledge(&self) -> bool {
        matches!(self, SearchSource::Knowledge | SearchSource::Both)
    }
}

impl std::fmt::Display for SearchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchSource::Web => write!(f, "web"),
            SearchSource::Knowledge => write!(f, "knowledge"),
            SearchSource::Both => write!(f, "both"),
        }
    }
}

impl FromStr for SearchSource {
    type Err = TaskloomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "web" => Ok(Self::Web),
            "knowledge" => Ok(Self::Knowledge),
            "both" => Ok(Self::Both),
            other => Err(TaskloomError::Validation(format!(
                "unknown search source '{other}'"
            ))),
        }
    }
}

/// Web search engine selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebEngine {
    /// serpapi.com Google search.
    #[default]
    SerpApi,
    /// google.serper.dev.
    Serper,
    /// searchapi.io.
    SearchApi,
}

impl WebEngine {
    /// Every supported engine.
    pub const ALL: [WebEngine; 3] = [WebEngine::SerpApi, WebEngine::Serper, WebEngine::SearchApi];

    /// Tag used in results and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            WebEngine::SerpApi => "serpapi",
            WebEngine::Serper => "serper",
            WebEngine::SearchApi => "searchapi",
        }
    }
}

impl std::fmt::Display for WebEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebEngine {
    type Err = TaskloomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "serpapi" => Ok(Self::SerpApi),
            "serper" => Ok(Self::Serper),
            "searchapi" => Ok(Self::SearchApi),
            other => Err(TaskloomError::Validation(format!(
                "unknown search engine '{other}'"
            ))),
        }
    }
}

/// A search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Search text.
    pub query: String,
    /// Backends to query.
    #[serde(default)]
    pub source: SearchSource,
    /// Engine for the web branch; ignored for `knowledge`.
    #[serde(default)]
    pub engine: WebEngine,
}

impl SearchQuery {
    /// Query for `query` against `source`.
    pub fn new(query: impl Into<String>, source: SearchSource, engine: WebEngine) -> Self {
        Self {
            query: query.into(),
            source,
            engine,
        }
    }
}

/// One normalized hit. Identity is `(source, url)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Result title.
    pub title: String,
    /// Link to the result.
    pub url: String,
    /// Short excerpt; may be empty.
    pub snippet: String,
    /// Originating backend: an engine name or `knowledge`.
    pub source: String,
}
