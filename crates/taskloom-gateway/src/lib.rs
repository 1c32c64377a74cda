//! REST and WebSocket surface of the taskloom engine.
//!
//! Exposes task management, search, chat, provider settings and the
//! knowledge-graph builder as JSON routes, streams task status changes over
//! `/ws`, and forwards training calls to an external service.

/// Route handlers.
pub mod api;
/// Error to HTTP response mapping.
pub mod error;
/// Router construction and the event stream.
pub mod server;
/// Training service boundary.
pub mod training;

pub use error::{status_for, ApiError};
pub use server::{AppState, GatewayServer};
pub use training::{HttpTrainingClient, TrainingClient, TrainingConfig, TrainingSession};
