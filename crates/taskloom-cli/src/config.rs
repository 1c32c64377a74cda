//! `taskloom.toml` loading.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use taskloom_core::{TaskloomError, TaskloomResult};
use taskloom_llm::{ProviderConfig, ProviderKind, ProviderSettings, RetryPolicy};
use taskloom_orchestrator::Enrichment;
use taskloom_retrieval::{SearchSettings, SearchSource, WebEngine};

#[derive(Debug, Deserialize)]
pub struct TaskloomConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub training: TrainingConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// `[providers]`: the default id plus `[[providers.entries]]`.
///
/// No entries means the built-in local-first defaults.
#[derive(Debug, Default, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub entries: Vec<ProviderEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEntry {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub kind: Option<ProviderKind>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl From<ProviderEntry> for ProviderConfig {
    fn from(entry: ProviderEntry) -> Self {
        let mut config = ProviderConfig::new(entry.id, entry.model);
        if let Some(name) = entry.name {
            config.name = name;
        }
        config.enabled = entry.enabled;
        config.kind = entry.kind;
        config.api_key = entry.api_key;
        config.base_url = entry.base_url;
        config.temperature = entry.temperature;
        config.max_tokens = entry.max_tokens;
        config
    }
}

#[derive(Debug, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_scheduler_tick_secs")]
    pub scheduler_tick_secs: u64,
    /// Ground task prompts in search results.
    #[serde(default)]
    pub enrich_tasks: bool,
    #[serde(default)]
    pub enrich_source: SearchSource,
    #[serde(default)]
    pub enrich_engine: WebEngine,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            scheduler_tick_secs: default_scheduler_tick_secs(),
            enrich_tasks: false,
            enrich_source: SearchSource::default(),
            enrich_engine: WebEngine::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn scheduler_tick(&self) -> Duration {
        Duration::from_secs(self.scheduler_tick_secs.max(1))
    }

    pub fn enrichment(&self) -> Option<Enrichment> {
        self.enrich_tasks.then_some(Enrichment {
            source: self.enrich_source,
            engine: self.enrich_engine,
        })
    }
}

/// `[training]`: base URL of the external training service.
#[derive(Debug, Default, Deserialize)]
pub struct TrainingConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_true() -> bool {
    true
}
fn default_request_timeout_secs() -> u64 {
    60
}
fn default_scheduler_tick_secs() -> u64 {
    1
}

impl Default for TaskloomConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            server: ServerConfig::default(),
            providers: ProvidersConfig::default(),
            search: SearchSettings::default(),
            runtime: RuntimeConfig::default(),
            training: TrainingConfig::default(),
        }
    }
}

impl TaskloomConfig {
    /// Parse TOML and fill secrets missing from the file from the environment.
    pub fn from_toml(content: &str) -> TaskloomResult<Self> {
        let mut config: TaskloomConfig = toml::from_str(content)
            .map_err(|e| TaskloomError::Config(format!("Failed to parse config: {e}")))?;
        config.search.fill_keys_from_env();
        Ok(config)
    }

    /// Load `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> TaskloomResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Config file not found, using defaults");
                let mut config = Self::default();
                config.search.fill_keys_from_env();
                Ok(config)
            }
            Err(e) => Err(TaskloomError::Config(format!(
                "Failed to read config '{}': {e}",
                path.display()
            ))),
        }
    }

    /// Validated provider snapshot with keys filled from the environment.
    pub fn provider_settings(&self) -> TaskloomResult<ProviderSettings> {
        provider_settings(&self.providers)
    }
}

/// Build a [`ProviderSettings`] snapshot from the `[providers]` section.
pub fn provider_settings(section: &ProvidersConfig) -> TaskloomResult<ProviderSettings> {
    let mut settings = if section.entries.is_empty() {
        ProviderSettings::default()
    } else {
        let providers: Vec<ProviderConfig> = section
            .entries
            .iter()
            .cloned()
            .map(ProviderConfig::from)
            .collect();
        let first = providers.first().map(|p| p.id.clone()).unwrap_or_default();
        ProviderSettings::new(first, providers)
    };
    if let Some(default) = &section.default {
        settings.default_provider = default.clone();
    }
    for provider in &mut settings.providers {
        provider.fill_key_from_env();
    }
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
data_dir = "/var/lib/taskloom"

[server]
port = 8080

[providers]
default = "openai"

[[providers.entries]]
id = "openai"
api_key = "sk-file"
model = "gpt-4"
temperature = 0.2

[[providers.entries]]
id = "ollama-gpu"
kind = "ollama"
base_url = "http://gpu:11434"
model = "llama3"
enabled = false

[search]
knowledge_endpoint = "http://docs:8000/api/v1/documents/similar"
knowledge_limit = 3

[search.serper]
api_key = "serper-file"

[runtime]
request_timeout_secs = 20
enrich_tasks = true
enrich_source = "both"
enrich_engine = "serper"

[runtime.retry]
max_retries = 2
"#;

    #[test]
    fn test_parse_full_config() {
        let config = TaskloomConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/taskloom"));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.search.knowledge_limit, 3);
        assert_eq!(config.search.serper.api_key(), Some("serper-file"));
        assert_eq!(config.runtime.request_timeout(), Duration::from_secs(20));
        assert_eq!(config.runtime.retry.max_retries, 2);
        assert_eq!(config.runtime.retry.backoff_base_ms, 1000);

        let enrichment = config.runtime.enrichment().unwrap();
        assert_eq!(enrichment.source, SearchSource::Both);
        assert_eq!(enrichment.engine, WebEngine::Serper);
    }

    #[test]
    fn test_provider_entries_become_settings() {
        let config = TaskloomConfig::from_toml(SAMPLE).unwrap();
        let settings = config.provider_settings().unwrap();
        assert_eq!(settings.default_provider, "openai");

        let openai = settings.get("openai").unwrap();
        assert_eq!(openai.api_key(), Some("sk-file"));
        assert_eq!(openai.temperature, Some(0.2));

        let gpu = settings.get("ollama-gpu").unwrap();
        assert!(!gpu.enabled);
        assert_eq!(gpu.resolved_kind().unwrap(), ProviderKind::Ollama);
    }

    #[test]
    fn test_shipped_example_does_not_retry() {
        let config = TaskloomConfig::from_toml(include_str!("../../../taskloom.toml")).unwrap();
        assert_eq!(config.runtime.retry.max_retries, 0);
        assert!(config.provider_settings().is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = TaskloomConfig::from_toml("").unwrap();
        assert_eq!(config.runtime.scheduler_tick(), Duration::from_secs(1));
        assert!(config.runtime.enrichment().is_none());
        assert!(config.training.endpoint.is_none());

        let settings = config.provider_settings().unwrap();
        assert_eq!(settings.default_provider, "ollama");
    }

    #[test]
    fn test_unknown_default_is_rejected() {
        let config = TaskloomConfig::from_toml(
            r#"
[providers]
default = "missing"

[[providers.entries]]
id = "ollama"
model = "llama2"
"#,
        )
        .unwrap();
        assert!(config.provider_settings().is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = TaskloomConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = TaskloomConfig::from_toml("{{ nope").unwrap_err();
        assert!(matches!(err, TaskloomError::Config(_)));
    }
}
