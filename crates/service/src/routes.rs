use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, routing::post, Json, Router};
use decor_core::{AssistantTask, ConversationTurn, PricingCatalog, ProjectEstimate};
use decor_llm::{AttemptCounter, CompletionBackend};
use decor_rag::{Assistant, AssistantError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct AppState<B> {
    pub assistant: Assistant<B>,
}

pub fn router<B: CompletionBackend + 'static>(state: Arc<AppState<B>>) -> Router {
    Router::new()
        .route("/health", get(health::<B>))
        .route("/catalog", get(catalog::<B>))
        .route("/chat", post(chat::<B>))
        .route("/calculate", post(calculate::<B>))
        .route("/compare", post(compare::<B>))
        .route("/proposal", post(proposal::<B>))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
}

#[derive(Debug, Deserialize)]
pub struct CompareBody {
    pub item1: String,
    pub item2: String,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub result: String,
    pub model: String,
    pub attempts: u32,
}

async fn health<B: CompletionBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
) -> Json<serde_json::Value> {
    let gateway = state.assistant.gateway();
    Json(json!({
        "status": "ok",
        "embedder_ready": gateway.embedder().is_initialized(),
        "live_connections": gateway.store().live_connections(),
    }))
}

async fn catalog<B: CompletionBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
) -> Json<PricingCatalog> {
    Json(state.assistant.catalog().clone())
}

async fn chat<B: CompletionBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Json<TaskResponse>, AppError> {
    let Json(body) = body.map_err(AppError::bad_request)?;
    let task = AssistantTask::Chat {
        message: body.message,
    };
    run_task(&state, task, &body.history).await
}

async fn calculate<B: CompletionBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    body: Result<Json<ProjectEstimate>, JsonRejection>,
) -> Result<Json<TaskResponse>, AppError> {
    let Json(estimate) = body.map_err(AppError::bad_request)?;
    run_task(&state, AssistantTask::Calculate(estimate), &[]).await
}

async fn compare<B: CompletionBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    body: Result<Json<CompareBody>, JsonRejection>,
) -> Result<Json<TaskResponse>, AppError> {
    let Json(body) = body.map_err(AppError::bad_request)?;
    let task = AssistantTask::Compare {
        item1: body.item1,
        item2: body.item2,
    };
    run_task(&state, task, &[]).await
}

async fn proposal<B: CompletionBackend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    body: Result<Json<ProjectEstimate>, JsonRejection>,
) -> Result<Json<TaskResponse>, AppError> {
    let Json(estimate) = body.map_err(AppError::bad_request)?;
    run_task(&state, AssistantTask::Proposal(estimate), &[]).await
}

async fn run_task<B: CompletionBackend>(
    state: &AppState<B>,
    task: AssistantTask,
    history: &[ConversationTurn],
) -> Result<Json<TaskResponse>, AppError> {
    // Cancelled when this future is dropped, i.e. when the client goes away.
    let cancel = CancellationToken::new();
    let _disconnect = cancel.clone().drop_guard();
    let counter = AttemptCounter::new();
    let reply = state
        .assistant
        .respond(&task, history, &counter, &cancel)
        .await?;
    info!(task = task.name(), model = %reply.model, attempts = reply.attempts, "task answered");
    Ok(Json(TaskResponse {
        result: reply.text,
        model: reply.model,
        attempts: reply.attempts,
    }))
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Upstream(String),
}

impl AppError {
    fn bad_request<E: ToString>(msg: E) -> Self {
        Self::BadRequest(msg.to_string())
    }
}

impl From<AssistantError> for AppError {
    fn from(err: AssistantError) -> Self {
        match err {
            AssistantError::Configuration(_) => Self::Unavailable(err.to_string()),
            AssistantError::InvalidTask(_) => Self::BadRequest(err.to_string()),
            AssistantError::Completion { .. } => Self::Upstream(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unavailable(msg) => {
                error!("configuration_error" = %msg);
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use decor_llm::{AttemptError, ChatMessage, Credentials, StaticCredentials};
    use decor_rag::{AssistantConfig, EmbeddingClient, EmbeddingProvider, SharedEmbedder, VectorStore, VectorStoreGateway};
    use std::time::Duration;
    use tower::ServiceExt;

    struct EchoBackend {
        fail_with: Option<AttemptError>,
    }

    #[async_trait]
    impl CompletionBackend for EchoBackend {
        async fn complete(
            &self,
            _credentials: &Credentials,
            model: &str,
            messages: &[ChatMessage],
        ) -> Result<String, AttemptError> {
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
            Ok(format!("{model}: {last}"))
        }
    }

    fn app(dir: &tempfile::TempDir, credentials: Option<Credentials>, fail_with: Option<AttemptError>) -> Router {
        let mut config = AssistantConfig::default();
        config.rag_db = dir.path().join("rag.sqlite");
        config.persona_path = dir.path().join("rules.txt");
        config.completion.models = vec!["m1".to_string()];
        let embedder = Arc::new(SharedEmbedder::new(|| {
            Ok(Arc::new(EmbeddingClient::hash()) as Arc<dyn EmbeddingProvider>)
        }));
        let gateway = VectorStoreGateway::new(
            VectorStore::new(&config.rag_db),
            embedder,
            Duration::from_secs(5),
        );
        let assistant = Assistant::new(
            &config,
            Arc::new(StaticCredentials(credentials)),
            gateway,
            EchoBackend { fail_with },
        );
        router(Arc::new(AppState { assistant }))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn key() -> Option<Credentials> {
        Some(Credentials::new("gsk-test"))
    }

    #[tokio::test]
    async fn chat_returns_model_answer() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(&dir, key(), None)
            .oneshot(post_json(
                "/chat",
                json!({"message": "harga wallpanel?", "history": [{"role": "model", "text": "Halo Kak"}]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["result"], "m1: harga wallpanel?");
        assert_eq!(body["model"], "m1");
        assert_eq!(body["attempts"], 0);
    }

    #[tokio::test]
    async fn missing_key_is_service_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(&dir, None, None)
            .oneshot(post_json("/chat", json!({"message": "halo"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("API key"));
    }

    #[tokio::test]
    async fn exhausted_chain_is_bad_gateway() {
        let dir = tempfile::tempdir().unwrap();
        let failure = AttemptError::from_status("m1", 429, None, "Rate limit reached".to_string());
        let response = app(&dir, key(), Some(failure))
            .oneshot(post_json("/compare", json!({"item1": "HPL", "item2": "Duco"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("429 - Rate limit reached"));
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(&dir, key(), None)
            .oneshot(post_json("/calculate", json!({"region": "mars"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn catalog_and_health() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir, key(), None);
        let response = app
            .clone()
            .oneshot(Request::get("/catalog").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["kitchen"].as_array().is_some_and(|items| !items.is_empty()));

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["live_connections"], 0);
    }
}
