use crate::api;
use crate::training::TrainingClient;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use taskloom_llm::ProviderGateway;
use taskloom_orchestrator::{Assistant, TaskManager};
use taskloom_retrieval::RetrievalFusion;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use uuid::Uuid;

/// Shared application state.
pub struct AppState {
    /// Task lifecycle and event source.
    pub manager: Arc<TaskManager>,
    /// Provider snapshot behind `/api/providers` and chat.
    pub gateway: Arc<ProviderGateway>,
    /// Backs `/api/search`.
    pub fusion: Arc<RetrievalFusion>,
    /// Backs `/api/chat`.
    pub assistant: Arc<Assistant>,
    /// `None` makes the training routes answer 503.
    pub training: Option<Arc<dyn TrainingClient>>,
}

impl AppState {
    /// State whose assistant searches through `fusion`.
    pub fn new(
        manager: Arc<TaskManager>,
        gateway: Arc<ProviderGateway>,
        fusion: Arc<RetrievalFusion>,
    ) -> Self {
        let assistant = Arc::new(Assistant::new(gateway.clone()).with_fusion(fusion.clone()));
        Self {
            manager,
            gateway,
            fusion,
            assistant,
            training: None,
        }
    }

    /// Forward the training routes to `training`.
    pub fn with_training(mut self, training: Arc<dyn TrainingClient>) -> Self {
        self.training = Some(training);
        self
    }
}

/// The HTTP and WebSocket surface.
pub struct GatewayServer;

impl GatewayServer {
    /// Router with every route mounted on `state`.
    pub fn build(state: AppState) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/ws", get(ws_handler))
            .route("/api/tasks", post(api::create_task).get(api::list_tasks))
            .route("/api/tasks/{id}", get(api::get_task).delete(api::delete_task))
            .route("/api/tasks/{id}/run", post(api::run_task))
            .route("/api/search", post(api::search))
            .route("/api/chat", post(api::chat))
            .route(
                "/api/providers",
                get(api::get_providers).put(api::put_providers),
            )
            .route("/api/knowledge/links", post(api::knowledge_links))
            .route("/api/training/start", post(api::start_training))
            .route("/api/training/sessions", get(api::list_training_sessions))
            .route("/api/training/sessions/{id}", get(api::get_training_session))
            .route(
                "/api/training/sessions/{id}/stop",
                post(api::stop_training_session),
            )
            .with_state(Arc::new(state))
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "taskloom",
        "persist_failures": state.manager.persist_failures(),
    }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Push every task event to the client as JSON until either side goes away.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = Uuid::new_v4();
    let mut events = state.manager.events().subscribe();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    info!(connection_id = %connection_id, "Event stream connected");

    let welcome = serde_json::json!({
        "type": "connected",
        "connection_id": connection_id,
    });
    if ws_sender
        .send(Message::Text(welcome.to_string().into()))
        .await
        .is_err()
    {
        return;
    }

    let mut send_task = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(connection_id = %connection_id, skipped, "Event stream lagging, events dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let Ok(json) = serde_json::to_string(&event) else {
                continue;
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Inbound frames are ignored; only a close ends the stream.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!(connection_id = %connection_id, "Event stream disconnected");
}
