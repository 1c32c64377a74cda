use super::{extract_text, send_json, LlmBackend, Prompt};
use crate::config::ProviderConfig;
use async_trait::async_trait;
use taskloom_core::{TaskloomError, TaskloomResult};

/// OpenAI chat completions backend.
pub struct OpenAiBackend {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl OpenAiBackend {
    /// Adapter for `config`, sharing `http`.
    pub fn new(config: ProviderConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    fn build_body(&self, prompt: &Prompt) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": chat_messages(prompt),
        });
        if let Some(temperature) = self.config.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if let Some(max_tokens) = self.config.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        body
    }
}

/// `[system?, user]` message list in the chat-completions shape.
pub(crate) fn chat_messages(prompt: &Prompt) -> Vec<serde_json::Value> {
    let mut messages = Vec::new();
    if let Some(system) = &prompt.system {
        messages.push(serde_json::json!({"role": "system", "content": system}));
    }
    messages.push(serde_json::json!({"role": "user", "content": prompt.message}));
    messages
}

/// Bearer-authenticated POST builder shared by the chat-completions backends.
pub(crate) fn bearer_post(
    http: &reqwest::Client,
    config: &ProviderConfig,
    url: &str,
) -> TaskloomResult<reqwest::RequestBuilder> {
    let key = config.api_key().ok_or_else(|| {
        TaskloomError::ProviderResolution(format!("Provider '{}' requires an API key", config.id))
    })?;
    Ok(http
        .post(url)
        .header("Authorization", format!("Bearer {key}"))
        .header("Content-Type", "application/json"))
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn provider_id(&self) -> &str {
        &self.config.id
    }

    async fn complete(&self, prompt: &Prompt) -> TaskloomResult<String> {
        let url = format!("{}/v1/chat/completions", self.config.base_url()?);
        let request = bearer_post(&self.http, &self.config, &url)?;
        let body = self.build_body(prompt);

        let resp = send_json(&self.config.id, request, &body).await?;
        extract_text(&self.config.id, &resp, "/choices/0/message/content")
    }
}
