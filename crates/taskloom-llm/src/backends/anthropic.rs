use super::{send_json, LlmBackend, Prompt};
use crate::config::ProviderConfig;
use async_trait::async_trait;
use taskloom_core::{TaskloomError, TaskloomResult};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Anthropic messages API backend.
///
/// The API requires `max_tokens`; when unset the backend sends 1024.
/// Temperature is not forwarded.
pub struct AnthropicBackend {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl AnthropicBackend {
    /// Adapter for `config`, sharing `http`.
    pub fn new(config: ProviderConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    fn build_body(&self, prompt: &Prompt) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": [{"role": "user", "content": prompt.message}],
        });
        if let Some(system) = &prompt.system {
            body["system"] = serde_json::json!(system);
        }
        body
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    fn provider_id(&self) -> &str {
        &self.config.id
    }

    async fn complete(&self, prompt: &Prompt) -> TaskloomResult<String> {
        let url = format!("{}/v1/messages", self.config.base_url()?);
        let key = self.config.api_key().ok_or_else(|| {
            TaskloomError::ProviderResolution(format!(
                "Provider '{}' requires an API key",
                self.config.id
            ))
        })?;
        let request = self
            .http
            .post(&url)
            .header("x-api-key", key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json");
        let body = self.build_body(prompt);

        let resp = send_json(&self.config.id, request, &body).await?;
        parse_content(&self.config.id, &resp)
    }
}

/// Concatenate every text block of a messages-API reply.
fn parse_content(provider: &str, body: &serde_json::Value) -> TaskloomResult<String> {
    let blocks = body
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| TaskloomError::provider_call(provider, "response is missing 'content'"))?;

    Ok(blocks
        .iter()
        .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join(""))
}
