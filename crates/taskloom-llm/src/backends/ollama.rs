use super::{extract_text, send_json, LlmBackend, Prompt};
use crate::config::ProviderConfig;
use async_trait::async_trait;
use taskloom_core::TaskloomResult;

/// Local Ollama server backend.
///
/// Uses the non-streaming `/api/chat` endpoint. Temperature and token limits
/// are left to the model's own defaults.
pub struct OllamaBackend {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl OllamaBackend {
    /// Adapter for `config`, sharing `http`.
    pub fn new(config: ProviderConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    fn build_body(&self, prompt: &Prompt) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(system) = &prompt.system {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": prompt.message}));

        serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "stream": false,
        })
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    fn provider_id(&self) -> &str {
        &self.config.id
    }

    async fn complete(&self, prompt: &Prompt) -> TaskloomResult<String> {
        let url = format!("{}/api/chat", self.config.base_url()?);
        let body = self.build_body(prompt);

        let resp = send_json(&self.config.id, self.http.post(&url), &body).await?;
        extract_text(&self.config.id, &resp, "/message/content")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_body_ignores_sampling_parameters() {
        let mut config = ProviderConfig::new("ollama", "llama2");
        config.temperature = Some(0.9);
        config.max_tokens = Some(64);
        let backend = OllamaBackend::new(config, reqwest::Client::new());

        let body = backend.build_body(&Prompt::new("hi").with_system("be brief"));
        assert_eq!(body["model"], "llama2");
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert!(body.get("temperature").is_none());
        assert!(body.get("options").is_none());
    }
}
