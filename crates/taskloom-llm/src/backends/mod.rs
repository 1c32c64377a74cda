/// Anthropic Messages API adapter.
pub mod anthropic;
/// Ollama `/api/generate` adapter.
pub mod ollama;
/// OpenAI chat completions adapter.
pub mod openai;
/// xAI chat completions adapter.
pub mod xai;

pub use anthropic::AnthropicBackend;
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;
pub use xai::XaiBackend;

use crate::config::{ProviderConfig, ProviderKind};
use async_trait::async_trait;
use taskloom_core::{TaskloomError, TaskloomResult};

/// A single prompt as seen by a backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prompt {
    /// Optional system/persona instruction.
    pub system: Option<String>,
    /// User message.
    pub message: String,
}

impl Prompt {
    /// Prompt with only a user message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            system: None,
            message: message.into(),
        }
    }

    /// Add a system instruction.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Trait for language-model provider backends.
///
/// Each provider (Ollama, OpenAI, Anthropic, xAI) implements this trait to
/// handle its own wire format. Every backend must return the assistant text
/// or fail with [`TaskloomError::ProviderCall`] tagged with its provider id.
///
/// To add a new provider:
/// 1. Create a new module in `backends/`
/// 2. Implement `LlmBackend` for your struct
/// 3. Add the variant to `ProviderKind` in `config.rs`
/// 4. Wire it up in [`HttpBackendFactory::create`]
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Identifier of the provider this backend was built for.
    fn provider_id(&self) -> &str;

    /// Non-streaming completion returning the assistant text.
    async fn complete(&self, prompt: &Prompt) -> TaskloomResult<String>;
}

/// Builds a backend for a resolved provider configuration.
///
/// The gateway asks the factory for a fresh backend per call so that a
/// replaced settings snapshot takes effect on the next request.
pub trait BackendFactory: Send + Sync {
    /// Backend for `config`.
    fn create(&self, config: &ProviderConfig) -> TaskloomResult<Box<dyn LlmBackend>>;
}

/// Default factory dispatching on [`ProviderKind`] and sharing one HTTP client.
#[derive(Debug, Clone, Default)]
pub struct HttpBackendFactory {
    http: reqwest::Client,
}

impl HttpBackendFactory {
    /// Factory whose backends share `http`.
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl BackendFactory for HttpBackendFactory {
    fn create(&self, config: &ProviderConfig) -> TaskloomResult<Box<dyn LlmBackend>> {
        let http = self.http.clone();
        let config = config.clone();
        let backend: Box<dyn LlmBackend> = match config.resolved_kind()? {
            ProviderKind::Ollama => Box::new(OllamaBackend::new(config, http)),
            ProviderKind::OpenAi => Box::new(OpenAiBackend::new(config, http)),
            ProviderKind::Anthropic => Box::new(AnthropicBackend::new(config, http)),
            ProviderKind::Xai => Box::new(XaiBackend::new(config, http)),
        };
        Ok(backend)
    }
}

/// Send a JSON request and decode the JSON body, mapping every failure to
/// a `ProviderCall` error for `provider`.
pub(crate) async fn send_json(
    provider: &str,
    request: reqwest::RequestBuilder,
    body: &serde_json::Value,
) -> TaskloomResult<serde_json::Value> {
    let resp = request
        .json(body)
        .send()
        .await
        .map_err(|e| TaskloomError::provider_call(provider, e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        let error_body = resp
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        return Err(TaskloomError::provider_call(
            provider,
            format!("HTTP {status}: {}", truncate(&error_body, 500)),
        ));
    }

    resp.json()
        .await
        .map_err(|e| TaskloomError::provider_call(provider, format!("invalid JSON body: {e}")))
}

/// Pull a string out of a decoded body or fail with a `ProviderCall` error.
pub(crate) fn extract_text(
    provider: &str,
    body: &serde_json::Value,
    pointer: &str,
) -> TaskloomResult<String> {
    body.pointer(pointer)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            TaskloomError::provider_call(provider, format!("response is missing '{pointer}'"))
        })
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_dispatches_by_kind() {
        let factory = HttpBackendFactory::default();
        for id in ["ollama", "openai", "anthropic", "xai"] {
            let backend = factory.create(&ProviderConfig::new(id, "m")).unwrap();
            assert_eq!(backend.provider_id(), id);
        }
        assert!(factory.create(&ProviderConfig::new("mystery", "m")).is_err());
    }

    #[test]
    fn test_extract_text_missing_field() {
        let body = serde_json::json!({"choices": []});
        let err = extract_text("openai", &body, "/choices/0/message/content").unwrap_err();
        assert!(err.to_string().contains("[openai]"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
