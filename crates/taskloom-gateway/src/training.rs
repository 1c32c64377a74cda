//! Boundary to the external training subsystem.
//!
//! The engine never trains anything itself. These calls are forwarded as-is
//! to a training service and its answers passed back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use taskloom_core::{TaskloomError, TaskloomResult};

/// Parameters of a training session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Number of passes over the training data; at least 1.
    pub epochs: u32,
    /// Examples per step.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Optimizer step size.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Base model to fine-tune.
    #[serde(default = "default_model_name")]
    pub model_name: String,
    /// Extra parameters passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<HashMap<String, serde_json::Value>>,
}

fn default_batch_size() -> u32 {
    32
}

fn default_learning_rate() -> f64 {
    0.001
}

fn default_model_name() -> String {
    "llama2".to_string()
}

impl TrainingConfig {
    /// Config with `epochs` and default values for the rest.
    pub fn new(epochs: u32) -> Self {
        Self {
            epochs,
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
            model_name: default_model_name(),
            parameters: None,
        }
    }
}

/// A session as reported by the training service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSession {
    /// Session identifier assigned by the service.
    pub id: String,
    /// Service-reported state, such as `running` or `completed`.
    pub status: String,
    /// Completion fraction in `[0, 1]`.
    #[serde(default)]
    pub progress: f64,
    /// Parameters the session was started with.
    pub config: TrainingConfig,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When training began.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When training ended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure reason of a failed session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Client of the external model-training service.
#[async_trait]
pub trait TrainingClient: Send + Sync {
    /// `startTraining(epochs, ...)`.
    async fn start(&self, config: TrainingConfig) -> TaskloomResult<TrainingSession>;
    /// Status of one session; `None` if the service does not know it.
    async fn session(&self, id: &str) -> TaskloomResult<Option<TrainingSession>>;
    /// Every session the service knows.
    async fn sessions(&self) -> TaskloomResult<Vec<TrainingSession>>;
    /// Ask the service to stop a session.
    async fn stop(&self, id: &str) -> TaskloomResult<()>;
}

/// Client for a training service mounted at `base_url`
/// (`POST /start`, `GET /sessions`, `GET /sessions/{id}`, `POST /sessions/{id}/stop`).
pub struct HttpTrainingClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpTrainingClient {
    /// Client for the service rooted at `base_url`.
    pub fn new(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> TaskloomResult<reqwest::Response> {
        let resp = request
            .send()
            .await
            .map_err(|e| TaskloomError::Training(e.to_string()))?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND || status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(TaskloomError::Training(format!(
            "HTTP {status}: {}",
            body.chars().take(500).collect::<String>()
        )))
    }

    async fn parse<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> TaskloomResult<T> {
        resp.json()
            .await
            .map_err(|e| TaskloomError::Training(format!("invalid JSON body: {e}")))
    }
}

#[async_trait]
impl TrainingClient for HttpTrainingClient {
    async fn start(&self, config: TrainingConfig) -> TaskloomResult<TrainingSession> {
        let url = format!("{}/start", self.base_url);
        let resp = self.send(self.http.post(url).json(&config)).await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(TaskloomError::Training("start endpoint not found".into()));
        }
        let session: TrainingSession = Self::parse(resp).await?;
        tracing::info!(session_id = %session.id, epochs = config.epochs, "Training session started");
        Ok(session)
    }

    async fn session(&self, id: &str) -> TaskloomResult<Option<TrainingSession>> {
        let url = format!("{}/sessions/{id}", self.base_url);
        let resp = self.send(self.http.get(url)).await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::parse(resp).await.map(Some)
    }

    async fn sessions(&self) -> TaskloomResult<Vec<TrainingSession>> {
        let url = format!("{}/sessions", self.base_url);
        let resp = self.send(self.http.get(url)).await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        Self::parse(resp).await
    }

    async fn stop(&self, id: &str) -> TaskloomResult<()> {
        let url = format!("{}/sessions/{id}/stop", self.base_url);
        let resp = self.send(self.http.post(url)).await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(TaskloomError::Training(format!("session '{id}' not found")));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: TrainingConfig = serde_json::from_str(r#"{"epochs": 3}"#).unwrap();
        assert_eq!(config, TrainingConfig::new(3));
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.model_name, "llama2");
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = HttpTrainingClient::new("http://trainer:8000/api/v1/training/", reqwest::Client::new());
        assert_eq!(client.base_url, "http://trainer:8000/api/v1/training");
    }
}
