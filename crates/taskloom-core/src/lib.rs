//! Core types and error definitions for the taskloom engine.
//!
//! This crate provides the foundational types shared across all taskloom crates:
//! the error taxonomy every component reports through, and the bus on which
//! task status changes are published to observers.
//!
//! # Main types
//!
//! - [`TaskloomError`]: Unified error enum for all taskloom subsystems.
//! - [`TaskloomResult`]: Convenience alias for `Result<T, TaskloomError>`.
//! - [`TaskEvent`]: A task status-change notification.
//! - [`EventBus`]: Broadcast fan-out of [`TaskEvent`]s to any number of subscribers.

/// Task status-change events and their broadcast bus.
pub mod events;

pub use events::{EventBus, TaskEvent, TaskEventKind};

use uuid::Uuid;

// --- Error types ---

/// Top-level error type for the taskloom engine.
///
/// `Validation` and `ConcurrentRun` are raised synchronously at the call
/// boundary and never touch task state. `ProviderCall` and `SearchBackend`
/// abort the run they occur in and are recorded on the failed task.
#[derive(Debug, thiserror::Error)]
pub enum TaskloomError {
    /// A task specification was rejected before anything was persisted.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The requested provider is unknown, disabled, or cannot be dispatched.
    #[error("Provider resolution error: {0}")]
    ProviderResolution(String),

    /// A language-model backend failed, returned a non-success status, or timed out.
    #[error("Provider call error [{provider}]: {message}")]
    ProviderCall {
        /// Identifier of the backend that failed.
        provider: String,
        /// Failure description (status, body excerpt, or timeout).
        message: String,
    },

    /// A search backend (web engine or knowledge base) failed.
    #[error("Search backend error [{engine}]: {message}")]
    SearchBackend {
        /// Engine tag (`serpapi`, `serper`, `searchapi`, `knowledge`).
        engine: String,
        /// Failure description.
        message: String,
    },

    /// A run was triggered for a task that is already running.
    #[error("Task {0} is already running")]
    ConcurrentRun(Uuid),

    /// No task with the given identifier exists.
    #[error("Task {0} not found")]
    TaskNotFound(Uuid),

    /// The requested status transition is not allowed from the current state.
    #[error("Task {task_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Task the transition was requested for.
        task_id: Uuid,
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },

    /// A run was cancelled before its outcome could be recorded.
    #[error("Run for task {0} was cancelled")]
    Cancelled(Uuid),

    /// A run panicked; the task is recorded as failed with the panic message.
    #[error("Run panicked: {0}")]
    RunPanicked(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from the task persistence layer.
    #[error("Store error: {0}")]
    Store(String),

    /// An error from the external training subsystem.
    #[error("Training error: {0}")]
    Training(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`TaskloomError`].
pub type TaskloomResult<T> = Result<T, TaskloomError>;

impl TaskloomError {
    /// Build a [`TaskloomError::ProviderCall`] tagged with the backend identifier.
    pub fn provider_call(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderCall {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Build a [`TaskloomError::SearchBackend`] tagged with the engine name.
    pub fn search_backend(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SearchBackend {
            engine: engine.into(),
            message: message.into(),
        }
    }

    /// Short machine-readable kind, used in API error bodies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::ProviderResolution(_) => "provider_resolution",
            Self::ProviderCall { .. } => "provider_call",
            Self::SearchBackend { .. } => "search_backend",
            Self::ConcurrentRun(_) => "concurrent_run",
            Self::TaskNotFound(_) => "not_found",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Cancelled(_) => "cancelled",
            Self::RunPanicked(_) => "run_panicked",
            Self::Config(_) => "config",
            Self::Store(_) => "store",
            Self::Training(_) => "training",
            Self::Json(_) => "json",
            Self::Io(_) => "io",
        }
    }

    /// Whether a caller-side retry has a chance of succeeding.
    ///
    /// Only backend errors qualify, and only for timeouts, rate limiting (429)
    /// and server-side failures (5xx). Client errors such as 400 or 404 are
    /// final.
    pub fn is_retryable(&self) -> bool {
        let message = match self {
            Self::ProviderCall { message, .. } | Self::SearchBackend { message, .. } => {
                message.to_lowercase()
            }
            _ => return false,
        };

        if message.contains("400") || message.contains("404") {
            return false;
        }

        message.contains("timed out")
            || message.contains("timeout")
            || message.contains("429")
            || message.contains("500")
            || message.contains("502")
            || message.contains("503")
            || message.contains("504")
    }
}
