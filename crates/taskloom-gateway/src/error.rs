use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use taskloom_core::TaskloomError;
use tracing::{error, warn};

/// A [`TaskloomError`] rendered as `{"error": <kind>, "message": <text>}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    /// Error with an explicit status and kind.
    pub fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }

    /// HTTP status this error renders with.
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

/// HTTP status for an engine error.
pub fn status_for(err: &TaskloomError) -> StatusCode {
    match err {
        TaskloomError::Validation(_) => StatusCode::BAD_REQUEST,
        TaskloomError::TaskNotFound(_) => StatusCode::NOT_FOUND,
        TaskloomError::ConcurrentRun(_) | TaskloomError::InvalidTransition { .. } => {
            StatusCode::CONFLICT
        }
        TaskloomError::ProviderResolution(_) => StatusCode::UNPROCESSABLE_ENTITY,
        TaskloomError::ProviderCall { .. } | TaskloomError::SearchBackend { .. } => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<TaskloomError> for ApiError {
    fn from(err: TaskloomError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            error!(kind = err.kind(), error = %err, "Request failed");
        } else {
            warn!(kind = err.kind(), error = %err, "Request rejected");
        }
        Self::new(status, err.kind(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.kind,
            "message": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}
