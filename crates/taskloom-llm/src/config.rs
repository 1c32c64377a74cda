use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use taskloom_core::{TaskloomError, TaskloomResult};

/// Placeholder shown instead of an API key.
pub const REDACTED: &str = "********";

/// Wire format family a provider speaks. Selects the backend adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Local Ollama server (`/api/chat`).
    Ollama,
    /// OpenAI chat completions.
    #[serde(rename = "openai")]
    OpenAi,
    /// Anthropic messages API.
    Anthropic,
    /// xAI (Grok) chat completions.
    Xai,
}

impl ProviderKind {
    /// Map a provider identifier onto an adapter, if one exists.
    pub fn from_id(id: &str) -> Option<Self> {
        match id.to_ascii_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            "openai" => Some(Self::OpenAi),
            "anthropic" => Some(Self::Anthropic),
            "xai" => Some(Self::Xai),
            _ => None,
        }
    }

    /// Default API root when the provider has no `base_url`.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "http://localhost:11434",
            ProviderKind::OpenAi => "https://api.openai.com",
            ProviderKind::Anthropic => "https://api.anthropic.com",
            ProviderKind::Xai => "https://api.x.ai",
        }
    }

    /// Whether calls are authenticated with an API key.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, ProviderKind::Ollama)
    }

    /// Environment variable consulted when no key is configured.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Ollama => None,
            ProviderKind::OpenAi => Some("OPENAI_API_KEY"),
            ProviderKind::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderKind::Xai => Some("XAI_API_KEY"),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Ollama => write!(f, "ollama"),
            ProviderKind::OpenAi => write!(f, "openai"),
            ProviderKind::Anthropic => write!(f, "anthropic"),
            ProviderKind::Xai => write!(f, "xai"),
        }
    }
}

/// One configured language-model backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Unique provider identifier.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Disabled providers never resolve.
    #[serde(default)]
    pub enabled: bool,
    /// Explicit adapter; when absent the adapter is derived from `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ProviderKind>,
    /// Credential; falls back to the provider's env var when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// API root; the adapter's default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Model used when the caller names none.
    #[serde(default)]
    pub model: String,
    /// Sampling temperature, for adapters that take one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Output token cap, for adapters that take one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ProviderConfig {
    /// A provider with the given id and model, enabled, everything else unset.
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            enabled: true,
            kind: None,
            api_key: None,
            base_url: None,
            model: model.into(),
            temperature: None,
            max_tokens: None,
        }
    }

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

    /// Pick the adapter explicitly.
    pub fn with_kind(mut self, kind: ProviderKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Mark the provider disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// The adapter this provider dispatches to.
    pub fn resolved_kind(&self) -> TaskloomResult<ProviderKind> {
        self.kind
            .or_else(|| ProviderKind::from_id(&self.id))
            .ok_or_else(|| {
                TaskloomError::ProviderResolution(format!(
                    "Provider '{}' has no supported backend",
                    self.id
                ))
            })
    }

    /// API root with any trailing slash removed.
    pub fn base_url(&self) -> TaskloomResult<String> {
        let url = match &self.base_url {
            Some(url) if !url.trim().is_empty() => url.clone(),
            _ => self.resolved_kind()?.default_base_url().to_string(),
        };
        Ok(url.trim_end_matches('/').to_string())
    }

    /// The configured key, if it is non-blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }

    /// Fail before any network traffic when a key-authenticated backend has no key.
    pub fn check_credentials(&self) -> TaskloomResult<()> {
        if self.resolved_kind()?.requires_api_key() && self.api_key().is_none() {
            return Err(TaskloomError::ProviderResolution(format!(
                "Provider '{}' requires an API key",
                self.id
            )));
        }
        Ok(())
    }

    /// Fill a missing API key from the adapter's environment variable.
    pub fn fill_key_from_env(&mut self) {
        if self.api_key().is_some() {
            return;
        }
        let env_key = self
            .resolved_kind()
            .ok()
            .and_then(|kind| kind.api_key_env())
            .and_then(|var| std::env::var(var).ok());
        if let Some(key) = env_key {
            self.api_key = Some(key);
        }
    }

    /// Copy safe to hand to API clients.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.api_key.is_some() {
            copy.api_key = Some(REDACTED.to_string());
        }
        copy
    }
}

/// An immutable snapshot of the provider configuration set.
///
/// Components never mutate a snapshot in place: an update builds a new
/// `ProviderSettings` and swaps it into the gateway, so a run that already
/// resolved its provider keeps a consistent view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    /// Provider used when a request names none.
    pub default_provider: String,
    /// Every configured provider, enabled or not.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl ProviderSettings {
    /// Settings from a default id and a provider list. Not validated.
    pub fn new(default_provider: impl Into<String>, providers: Vec<ProviderConfig>) -> Self {
        Self {
            default_provider: default_provider.into(),
            providers,
        }
    }

    /// Structural checks: unique ids and a default that names a configured provider.
    pub fn validate(&self) -> TaskloomResult<()> {
        let mut seen = HashSet::new();
        for provider in &self.providers {
            if provider.id.trim().is_empty() {
                return Err(TaskloomError::Config("Provider id must not be empty".into()));
            }
            if !seen.insert(provider.id.as_str()) {
                return Err(TaskloomError::Config(format!(
                    "Duplicate provider id '{}'",
                    provider.id
                )));
            }
        }
        if !seen.contains(self.default_provider.as_str()) {
            return Err(TaskloomError::Config(format!(
                "Default provider '{}' is not configured",
                self.default_provider
            )));
        }
        Ok(())
    }

    /// Provider with the given id.
    pub fn get(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }

    /// Resolve `provider_id` (or the default) to an enabled provider.
    ///
    /// A disabled provider is never returned, not even as the default.
    pub fn resolve(&self, provider_id: Option<&str>) -> TaskloomResult<&ProviderConfig> {
        let id = provider_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or(&self.default_provider);
        let provider = self.get(id).ok_or_else(|| {
            TaskloomError::ProviderResolution(format!("Provider '{id}' is not configured"))
        })?;
        if !provider.enabled {
            return Err(TaskloomError::ProviderResolution(format!(
                "Provider '{id}' is disabled"
            )));
        }
        Ok(provider)
    }

    /// Same settings with every API key redacted.
    pub fn redacted(&self) -> Self {
        Self {
            default_provider: self.default_provider.clone(),
            providers: self.providers.iter().map(ProviderConfig::redacted).collect(),
        }
    }

    /// Put back keys a client echoed as [`REDACTED`], taking them from `current`.
    pub fn restore_redacted(&mut self, current: &ProviderSettings) {
        for provider in &mut self.providers {
            if provider.api_key.as_deref() == Some(REDACTED) {
                provider.api_key = current.get(&provider.id).and_then(|p| p.api_key.clone());
            }
        }
    }
}

impl Default for ProviderSettings {
    /// Local-first defaults: Ollama enabled, hosted backends present but disabled.
    fn default() -> Self {
        Self {
            default_provider: "ollama".to_string(),
            providers: vec![
                ProviderConfig {
                    name: "Ollama".into(),
                    base_url: Some(ProviderKind::Ollama.default_base_url().into()),
                    ..ProviderConfig::new("ollama", "llama2")
                },
                ProviderConfig {
                    name: "OpenAI".into(),
                    ..ProviderConfig::new("openai", "gpt-4").disabled()
                },
                ProviderConfig {
                    name: "Anthropic".into(),
                    ..ProviderConfig::new("anthropic", "claude-3-opus").disabled()
                },
                ProviderConfig {
                    name: "xAI".into(),
                    ..ProviderConfig::new("xai", "grok-beta").disabled()
                },
            ],
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_id() {
        assert_eq!(ProviderKind::from_id("ollama"), Some(ProviderKind::Ollama));
        assert_eq!(ProviderKind::from_id("OpenAI"), Some(ProviderKind::OpenAi));
        assert_eq!(ProviderKind::from_id("xai"), Some(ProviderKind::Xai));
        assert_eq!(ProviderKind::from_id("mistral"), None);
    }

    #[test]
    fn test_explicit_kind_overrides_id() {
        let provider = ProviderConfig::new("ollama-gpu", "llama3").with_kind(ProviderKind::Ollama);
        assert_eq!(provider.resolved_kind().unwrap(), ProviderKind::Ollama);
        assert!(ProviderConfig::new("ollama-gpu", "llama3").resolved_kind().is_err());
    }

    #[test]
    fn test_base_url_default_and_override() {
        let provider = ProviderConfig::new("anthropic", "claude");
        assert_eq!(provider.base_url().unwrap(), "https://api.anthropic.com");

        let provider = provider.with_base_url("http://localhost:8080/");
        assert_eq!(provider.base_url().unwrap(), "http://localhost:8080");
    }

    #[test]
    fn test_resolve_default_and_explicit() {
        let settings = ProviderSettings::default();
        assert_eq!(settings.resolve(None).unwrap().id, "ollama");
        assert_eq!(settings.resolve(Some("")).unwrap().id, "ollama");
        assert!(matches!(
            settings.resolve(Some("openai")),
            Err(TaskloomError::ProviderResolution(_))
        ));
        assert!(matches!(
            settings.resolve(Some("unknown")),
            Err(TaskloomError::ProviderResolution(_))
        ));
    }

    #[test]
    fn test_disabled_default_never_resolves() {
        let settings = ProviderSettings::new(
            "ollama",
            vec![ProviderConfig::new("ollama", "llama2").disabled()],
        );
        let err = settings.resolve(None).unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    #[test]
    fn test_validate_rejects_duplicates_and_missing_default() {
        let dup = ProviderSettings::new(
            "ollama",
            vec![
                ProviderConfig::new("ollama", "a"),
                ProviderConfig::new("ollama", "b"),
            ],
        );
        assert!(dup.validate().is_err());

        let missing = ProviderSettings::new("openai", vec![ProviderConfig::new("ollama", "a")]);
        assert!(missing.validate().is_err());

        assert!(ProviderSettings::default().validate().is_ok());
    }

    #[test]
    fn test_check_credentials() {
        assert!(ProviderConfig::new("ollama", "llama2").check_credentials().is_ok());
        assert!(ProviderConfig::new("openai", "gpt-4").check_credentials().is_err());
        assert!(ProviderConfig::new("openai", "gpt-4")
            .with_api_key("  ")
            .check_credentials()
            .is_err());
        assert!(ProviderConfig::new("openai", "gpt-4")
            .with_api_key("sk-test")
            .check_credentials()
            .is_ok());
    }

    #[test]
    fn test_redacted_hides_keys() {
        let settings = ProviderSettings::new(
            "openai",
            vec![ProviderConfig::new("openai", "gpt-4").with_api_key("sk-secret")],
        );
        let json = serde_json::to_string(&settings.redacted()).unwrap();
        assert!(!json.contains("sk-secret"));
        assert!(json.contains("defaultProvider"));
    }

    #[test]
    fn test_restore_redacted_keeps_existing_key() {
        let current = ProviderSettings::new(
            "openai",
            vec![ProviderConfig::new("openai", "gpt-4").with_api_key("sk-secret")],
        );
        let mut echoed = current.redacted();
        echoed.providers[0].model = "gpt-4o".into();
        echoed.restore_redacted(&current);
        assert_eq!(echoed.providers[0].api_key(), Some("sk-secret"));
        assert_eq!(echoed.providers[0].model, "gpt-4o");
    }
}
