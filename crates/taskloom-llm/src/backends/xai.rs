use super::openai::{bearer_post, chat_messages};
use super::{extract_text, send_json, LlmBackend, Prompt};
use crate::config::ProviderConfig;
use async_trait::async_trait;
use taskloom_core::TaskloomResult;

/// Persona used when the caller supplies no system prompt.
pub const DEFAULT_PERSONA: &str = "You are Grok, a chatbot inspired by the Hitchhikers Guide to the Galaxy.";

/// xAI chat completions backend.
///
/// Always sends a system message, falling back to [`DEFAULT_PERSONA`].
/// Temperature defaults to 0 and token limits are not forwarded.
pub struct XaiBackend {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl XaiBackend {
    /// Adapter for `config`, sharing `http`.
    pub fn new(config: ProviderConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    fn build_body(&self, prompt: &Prompt) -> serde_json::Value {
        let mut prompt = prompt.clone();
        if prompt.system.is_none() {
            prompt.system = Some(DEFAULT_PERSONA.to_string());
        }
        serde_json::json!({
            "model": self.config.model,
            "messages": chat_messages(&prompt),
            "temperature": self.config.temperature.unwrap_or(0.0),
            "stream": false,
        })
    }
}

#[async_trait]
impl LlmBackend for XaiBackend {
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

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_body_uses_persona_and_zero_temperature() {
        let mut config = ProviderConfig::new("xai", "grok-beta").with_api_key("k");
        config.max_tokens = Some(99);
        let backend = XaiBackend::new(config, reqwest::Client::new());

        let body = backend.build_body(&Prompt::new("hi"));
        assert_eq!(body["messages"][0]["content"], DEFAULT_PERSONA);
        assert_eq!(body["temperature"], 0.0);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_body_keeps_caller_system_prompt() {
        let backend = XaiBackend::new(
            ProviderConfig::new("xai", "grok-beta").with_api_key("k"),
            reqwest::Client::new(),
        );
        let body = backend.build_body(&Prompt::new("hi").with_system("custom"));
        assert_eq!(body["messages"][0]["content"], "custom");
    }
}
