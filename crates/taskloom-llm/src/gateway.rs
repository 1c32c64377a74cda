use crate::backends::{BackendFactory, HttpBackendFactory, Prompt};
use crate::config::{ProviderConfig, ProviderSettings};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskloom_core::{TaskloomError, TaskloomResult};
use tracing::{debug, info, warn};

/// Default upper bound on a single provider call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A normalized chat request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatRequest {
    /// User message.
    pub message: String,
    /// Provider to use; `None` selects the default provider.
    pub provider_id: Option<String>,
    /// Overrides the provider's configured model for this call only.
    pub model: Option<String>,
    /// Optional system/persona instruction.
    pub system_prompt: Option<String>,
    /// Overrides the gateway's default timeout for this call only.
    pub timeout: Option<Duration>,
}

impl ChatRequest {
    /// Request for `message` on the default provider.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Send to `provider_id` instead of the default.
    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    /// Override the model for this call.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the system instruction.
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Override the timeout for this call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// The assistant's reply and which backend produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    /// Text returned by the backend.
    pub content: String,
    /// Provider that answered.
    pub provider: String,
    /// Model that answered.
    pub model: String,
}

/// Uniform entry point to every configured language-model backend.
///
/// Holds the current [`ProviderSettings`] snapshot behind an `Arc`; a call
/// clones the `Arc` once and uses that snapshot for its whole lifetime, so a
/// concurrent [`replace_settings`](Self::replace_settings) never produces a
/// half-updated view.
pub struct ProviderGateway {
    settings: RwLock<Arc<ProviderSettings>>,
    factory: Arc<dyn BackendFactory>,
    default_timeout: Duration,
}

impl ProviderGateway {
    /// Gateway dispatching over HTTP with [`DEFAULT_TIMEOUT`].
    pub fn new(settings: ProviderSettings) -> Self {
        Self::with_factory(settings, Arc::new(HttpBackendFactory::default()))
    }

    /// Gateway using a custom backend factory.
    pub fn with_factory(settings: ProviderSettings, factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            settings: RwLock::new(Arc::new(settings)),
            factory,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the timeout applied when a request carries none.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Timeout applied when a request carries none.
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Current settings snapshot.
    pub fn settings(&self) -> Arc<ProviderSettings> {
        self.settings.read().clone()
    }

    /// Current settings with API keys redacted, safe to expose over the API.
    pub fn providers(&self) -> ProviderSettings {
        self.settings().redacted()
    }

    /// Validate and atomically swap in a new settings snapshot.
    pub fn replace_settings(&self, settings: ProviderSettings) -> TaskloomResult<()> {
        settings.validate()?;
        info!(
            default_provider = %settings.default_provider,
            providers = settings.providers.len(),
            "Provider settings replaced"
        );
        *self.settings.write() = Arc::new(settings);
        Ok(())
    }

    /// Resolve a provider id (or the default) against the current snapshot.
    pub fn resolve(&self, provider_id: Option<&str>) -> TaskloomResult<ProviderConfig> {
        self.settings().resolve(provider_id).cloned()
    }

    /// Send one request and return the assistant reply.
    ///
    /// Fails with `ProviderResolution` before any network traffic if the
    /// provider is unknown, disabled or missing credentials. Backend failures
    /// and timeouts surface as `ProviderCall`. Nothing is retried here.
    pub async fn complete(&self, request: ChatRequest) -> TaskloomResult<ChatResponse> {
        let mut config = self.resolve(request.provider_id.as_deref())?;
        if let Some(model) = request.model.as_deref().filter(|m| !m.trim().is_empty()) {
            config.model = model.to_string();
        }
        config.check_credentials()?;

        let backend = self.factory.create(&config)?;
        let mut prompt = Prompt::new(request.message);
        prompt.system = request.system_prompt;
        let timeout = request.timeout.unwrap_or(self.default_timeout);

        info!(provider = %config.id, model = %config.model, "Dispatching chat request");
        let start = Instant::now();

        let content = match tokio::time::timeout(timeout, backend.complete(&prompt)).await {
            Ok(Ok(content)) => content,
            Ok(Err(e)) => {
                warn!(provider = %config.id, error = %e, "Provider call failed");
                return Err(e);
            }
            Err(_) => {
                warn!(provider = %config.id, timeout_ms = timeout.as_millis() as u64, "Provider call timed out");
                return Err(TaskloomError::provider_call(
                    &config.id,
                    format!("request timed out after {}ms", timeout.as_millis()),
                ));
            }
        };

        debug!(
            provider = %config.id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            chars = content.len(),
            "Provider call completed"
        );

        Ok(ChatResponse {
            content,
            provider: config.id,
            model: config.model,
        })
    }

    /// `chat(message, provider_id?)`: one message, assistant text back.
    pub async fn chat(
        &self,
        message: impl Into<String>,
        provider_id: Option<&str>,
    ) -> TaskloomResult<String> {
        let mut request = ChatRequest::new(message);
        request.provider_id = provider_id.map(str::to_string);
        Ok(self.complete(request).await?.content)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::backends::LlmBackend;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoBackend {
        id: String,
        model: String,
        delay: Duration,
    }

    #[async_trait]
    impl LlmBackend for EchoBackend {
        fn provider_id(&self) -> &str {
            &self.id
        }

        async fn complete(&self, prompt: &Prompt) -> TaskloomResult<String> {
            tokio::time::sleep(self.delay).await;
            Ok(format!("{}:{}:{}", self.id, self.model, prompt.message))
        }
    }

    #[derive(Default)]
    struct EchoFactory {
        created: AtomicUsize,
        delay: Duration,
    }

    impl BackendFactory for EchoFactory {
        fn create(&self, config: &ProviderConfig) -> TaskloomResult<Box<dyn LlmBackend>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(EchoBackend {
                id: config.id.clone(),
                model: config.model.clone(),
                delay: self.delay,
            }))
        }
    }

    fn settings() -> ProviderSettings {
        ProviderSettings::new(
            "ollama",
            vec![
                ProviderConfig::new("ollama", "llama2"),
                ProviderConfig::new("openai", "gpt-4").with_api_key("sk"),
                ProviderConfig::new("anthropic", "claude").disabled(),
                ProviderConfig::new("xai", "grok-beta"),
            ],
        )
    }

    #[tokio::test]
    async fn test_chat_uses_default_provider() {
        let gateway = ProviderGateway::with_factory(settings(), Arc::new(EchoFactory::default()));
        let resp = gateway.complete(ChatRequest::new("hi")).await.unwrap();
        assert_eq!(resp.content, "ollama:llama2:hi");
        assert_eq!(resp.provider, "ollama");
    }

    #[tokio::test]
    async fn test_chat_model_override() {
        let gateway = ProviderGateway::with_factory(settings(), Arc::new(EchoFactory::default()));
        let resp = gateway
            .complete(ChatRequest::new("hi").with_provider("openai").with_model("gpt-4o"))
            .await
            .unwrap();
        assert_eq!(resp.content, "openai:gpt-4o:hi");
        // The stored snapshot keeps its configured model.
        assert_eq!(gateway.resolve(Some("openai")).unwrap().model, "gpt-4");
    }

    #[tokio::test]
    async fn test_disabled_or_keyless_provider_never_reaches_backend() {
        let factory = Arc::new(EchoFactory::default());
        let gateway = ProviderGateway::with_factory(settings(), factory.clone());

        let err = gateway.chat("hi", Some("anthropic")).await.unwrap_err();
        assert!(matches!(err, TaskloomError::ProviderResolution(_)));

        let err = gateway.chat("hi", Some("xai")).await.unwrap_err();
        assert!(matches!(err, TaskloomError::ProviderResolution(_)));

        assert_eq!(factory.created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timeout_surfaces_as_provider_call() {
        let factory = Arc::new(EchoFactory {
            created: AtomicUsize::new(0),
            delay: Duration::from_millis(200),
        });
        let gateway = ProviderGateway::with_factory(settings(), factory);
        let err = gateway
            .complete(ChatRequest::new("hi").with_timeout(Duration::from_millis(10)))
            .await
            .unwrap_err();
        match err {
            TaskloomError::ProviderCall { provider, message } => {
                assert_eq!(provider, "ollama");
                assert!(message.contains("timed out"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_replace_settings_swaps_snapshot() {
        let gateway = ProviderGateway::with_factory(settings(), Arc::new(EchoFactory::default()));
        let before = gateway.settings();

        let next = ProviderSettings::new(
            "openai",
            vec![ProviderConfig::new("openai", "gpt-4").with_api_key("sk")],
        );
        gateway.replace_settings(next).unwrap();

        assert_eq!(before.default_provider, "ollama");
        assert_eq!(gateway.settings().default_provider, "openai");
        assert_eq!(gateway.chat("x", None).await.unwrap(), "openai:gpt-4:x");
    }

    #[test]
    fn test_replace_settings_rejects_invalid() {
        let gateway = ProviderGateway::with_factory(settings(), Arc::new(EchoFactory::default()));
        let bad = ProviderSettings::new("missing", vec![ProviderConfig::new("ollama", "x")]);
        assert!(gateway.replace_settings(bad).is_err());
        assert_eq!(gateway.settings().default_provider, "ollama");
    }

    #[test]
    fn test_providers_are_redacted() {
        let gateway = ProviderGateway::with_factory(settings(), Arc::new(EchoFactory::default()));
        let providers = gateway.providers();
        assert_eq!(
            providers.get("openai").unwrap().api_key.as_deref(),
            Some("********")
        );
    }
}
