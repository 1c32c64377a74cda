use crate::error::ApiError;
use crate::server::AppState;
use crate::training::{TrainingClient, TrainingConfig, TrainingSession};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use taskloom_core::TaskloomError;
use taskloom_llm::ProviderSettings;
use taskloom_orchestrator::{ChatReply, Task, TaskSpec};
use taskloom_retrieval::{
    build_graph, KnowledgeGraph, KnowledgeItem, SearchQuery, SearchResult, SearchSource,
    WebEngine, DEFAULT_LINK_THRESHOLD,
};
use uuid::Uuid;

type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// `POST /api/tasks`.
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(spec): Json<TaskSpec>,
) -> ApiResult<impl IntoResponse> {
    let task = state.manager.create_task(spec).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// `GET /api/tasks`, oldest first.
pub async fn list_tasks(State(state): State<Arc<AppState>>) -> Json<Vec<Task>> {
    Json(state.manager.list_tasks())
}

/// `GET /api/tasks/{id}`.
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    let task = state
        .manager
        .get_task(id)
        .ok_or(TaskloomError::TaskNotFound(id))?;
    Ok(Json(task))
}

/// `DELETE /api/tasks/{id}`. Cancels an in-flight run.
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.manager.delete_task(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Manual trigger. Answers as soon as the run has started.
pub async fn run_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let handle = state.manager.run_task(id).await?;
    let task = state
        .manager
        .get_task(handle.task_id)
        .ok_or(TaskloomError::TaskNotFound(id))?;
    Ok((StatusCode::ACCEPTED, Json(task)))
}

// ---------------------------------------------------------------------------
// Search and chat
// ---------------------------------------------------------------------------

/// `POST /api/search`.
pub async fn search(
    State(state): State<Arc<AppState>>,
    Json(query): Json<SearchQuery>,
) -> ApiResult<Json<Vec<SearchResult>>> {
    Ok(Json(state.fusion.search_query(&query).await?))
}

/// Body of `POST /api/chat`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    /// User message.
    pub content: String,
    /// Provider to answer with; the default provider when absent.
    #[serde(default)]
    pub provider_id: Option<String>,
    /// No source means no retrieval.
    #[serde(default)]
    pub search_source: Option<SearchSource>,
    /// Web engine for the search; defaults to Serper.
    #[serde(default)]
    pub search_engine: Option<WebEngine>,
}

/// `POST /api/chat`.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatBody>,
) -> ApiResult<Json<ChatReply>> {
    let search = body
        .search_source
        .map(|source| (source, body.search_engine.unwrap_or_default()));
    let reply = state
        .assistant
        .chat(&body.content, body.provider_id.as_deref(), search)
        .await?;
    Ok(Json(reply))
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// `GET /api/providers`, with API keys redacted.
pub async fn get_providers(State(state): State<Arc<AppState>>) -> Json<ProviderSettings> {
    Json(state.gateway.providers())
}

/// Replace the provider snapshot. Keys sent back redacted keep their current value.
pub async fn put_providers(
    State(state): State<Arc<AppState>>,
    Json(mut settings): Json<ProviderSettings>,
) -> ApiResult<Json<ProviderSettings>> {
    settings.restore_redacted(&state.gateway.settings());
    state
        .gateway
        .replace_settings(settings)
        .map_err(|e| match e {
            TaskloomError::Config(message) => TaskloomError::Validation(message),
            other => other,
        })?;
    Ok(Json(state.gateway.providers()))
}

// ---------------------------------------------------------------------------
// Knowledge graph
// ---------------------------------------------------------------------------

/// Body of `POST /api/knowledge/links`.
#[derive(Debug, Deserialize)]
pub struct LinksBody {
    /// Items to link; only those with embeddings get edges.
    pub items: Vec<KnowledgeItem>,
    /// Minimum cosine similarity for an edge.
    #[serde(default)]
    pub threshold: Option<f32>,
}

/// `POST /api/knowledge/links`.
pub async fn knowledge_links(Json(body): Json<LinksBody>) -> ApiResult<Json<KnowledgeGraph>> {
    let threshold = body.threshold.unwrap_or(DEFAULT_LINK_THRESHOLD);
    if !(-1.0..=1.0).contains(&threshold) {
        return Err(TaskloomError::Validation(format!(
            "threshold must be within [-1, 1], got {threshold}"
        ))
        .into());
    }
    Ok(Json(build_graph(&body.items, threshold)))
}

// ---------------------------------------------------------------------------
// Training boundary
// ---------------------------------------------------------------------------

fn training_client(state: &AppState) -> ApiResult<&Arc<dyn TrainingClient>> {
    state.training.as_ref().ok_or_else(|| {
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "training_unavailable",
            "no training endpoint is configured",
        )
    })
}

/// `POST /api/training/start`.
pub async fn start_training(
    State(state): State<Arc<AppState>>,
    Json(config): Json<TrainingConfig>,
) -> ApiResult<impl IntoResponse> {
    if config.epochs == 0 {
        return Err(TaskloomError::Validation("epochs must be at least 1".into()).into());
    }
    let session = training_client(&state)?.start(config).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// `GET /api/training/sessions`.
pub async fn list_training_sessions(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<TrainingSession>>> {
    Ok(Json(training_client(&state)?.sessions().await?))
}

/// `GET /api/training/sessions/{id}`.
pub async fn get_training_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<TrainingSession>> {
    training_client(&state)?
        .session(&id)
        .await?
        .map(Json)
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("training session '{id}' not found"),
            )
        })
}

/// `POST /api/training/sessions/{id}/stop`.
pub async fn stop_training_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    training_client(&state)?.stop(&id).await?;
    Ok(Json(serde_json::json!({"status": "stopped"})))
}
