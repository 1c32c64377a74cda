//! Provider gateway for the taskloom engine.
//!
//! Normalizes a single-message chat call across Ollama, OpenAI, Anthropic and
//! xAI. Each wire format lives in its own backend behind the [`LlmBackend`]
//! trait; the [`ProviderGateway`] resolves which backend to use from an
//! immutable [`ProviderSettings`] snapshot and enforces a per-call timeout.

/// Provider backends, one per wire format.
pub mod backends;
/// Provider configuration and settings snapshots.
pub mod config;
/// The provider gateway.
pub mod gateway;
/// Caller-side retry with exponential backoff.
pub mod retry;

pub use backends::{BackendFactory, HttpBackendFactory, LlmBackend, Prompt};
pub use config::{ProviderConfig, ProviderKind, ProviderSettings, REDACTED};
pub use gateway::{ChatRequest, ChatResponse, ProviderGateway, DEFAULT_TIMEOUT};
pub use retry::{retry_with_backoff, RetryPolicy};
