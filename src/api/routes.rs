//! HTTP route handlers.

use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::notify::Notifier;
use crate::queue::TaskQueue;
use crate::storage::Storage;
use crate::task::{Task, TaskId};
use crate::webhook::{correlate, parse_webhook, signature_from_headers, verify_signature};

use super::types::*;

const DEFAULT_LIST_LIMIT: usize = 20;
const MAX_LIST_LIMIT: usize = 100;
const API_CHAT_REF: &str = "api";

/// Shared application state.
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub queue: TaskQueue,
    pub notifier: Arc<dyn Notifier>,
    /// Empty disables signature checks on deploy webhooks.
    pub webhook_secret: String,
}

type ApiResult<T> = Result<T, (StatusCode, String)>;

fn internal(e: impl std::fmt::Display) -> (StatusCode, String) {
    tracing::error!("Request failed: {}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/tasks", post(create_task).get(list_tasks))
        .route("/api/tasks/:id", get(get_task))
        .route("/api/tasks/:id/cancel", post(cancel_task))
        .route("/webhook/deploy/:platform", post(deploy_webhook))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    state: Arc<AppState>,
    addr: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        queued: state.queue.size(),
        busy: state.queue.is_busy(),
    })
}

/// Save a new task and hand it to the queue.
async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<CreateTaskResponse>)> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "message must not be empty".to_string()));
    }

    let task = Task::new(
        message,
        req.chat_ref.unwrap_or_else(|| API_CHAT_REF.to_string()),
        req.message_ref.unwrap_or_default(),
    );
    state.storage.save_task(&task).map_err(internal)?;
    let task_id = task.id.clone();
    state.queue.enqueue(task);

    Ok((StatusCode::ACCEPTED, Json(CreateTaskResponse { task_id })))
}

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTasksQuery>,
) -> ApiResult<Json<Vec<Task>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);
    let tasks = state
        .storage
        .list_tasks(limit, query.offset.unwrap_or(0))
        .map_err(internal)?;
    Ok(Json(tasks))
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<TaskDetail>> {
    let id = TaskId::from(id);
    let task = match state.storage.get_task(&id).map_err(internal)? {
        Some(task) => task,
        None => state
            .queue
            .get_status(&id)
            .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Task {} not found", id)))?,
    };
    let result = match state.storage.get_task_result(&id).map_err(internal)? {
        Some(result) => Some(result),
        None => state.queue.get_result(&id),
    };
    Ok(Json(TaskDetail { task, result }))
}

async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<CancelResponse> {
    let cancelled = state.queue.cancel(&TaskId::from(id));
    Json(CancelResponse { cancelled })
}

/// Deploy platform callback. Correlation misses are logged, never surfaced.
async fn deploy_webhook(
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookResponse>> {
    if !state.webhook_secret.is_empty() {
        let Some(signature) = signature_from_headers(&headers) else {
            tracing::warn!(platform = %platform, "Missing webhook signature");
            return Err((StatusCode::UNAUTHORIZED, "Missing signature".to_string()));
        };
        if !verify_signature(&body, signature, &state.webhook_secret) {
            tracing::warn!(platform = %platform, "Invalid webhook signature");
            return Err((StatusCode::UNAUTHORIZED, "Invalid signature".to_string()));
        }
    }

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid JSON: {}", e)))?;
    let event = parse_webhook(&platform, &payload);
    tracing::info!(
        platform = %platform,
        status = event.status.as_str(),
        deploy_id = %event.deploy_id,
        "Webhook received"
    );

    let task = match correlate(&event, state.storage.as_ref()) {
        Ok(task) => task,
        Err(e) => {
            tracing::warn!("Webhook correlation failed: {}", e);
            None
        }
    };

    if let Some(task) = &task {
        state
            .notifier
            .deploy_event(&event.notification_for(task))
            .await;
    }

    Ok(Json(WebhookResponse {
        received: true,
        status: event.status,
        task_id: task.map(|t| t.id),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::DeployStatus;
    use crate::storage::MemoryStorage;
    use crate::task::{TaskResult, TaskStatus};
    use crate::test_support::RecordingNotifier;
    use crate::webhook::sign;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::util::ServiceExt;

    struct Harness {
        state: Arc<AppState>,
        storage: Arc<MemoryStorage>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness(secret: &str) -> Harness {
        let storage = Arc::new(MemoryStorage::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let state = Arc::new(AppState {
            storage: storage.clone(),
            queue: TaskQueue::new(Duration::from_secs(5)),
            notifier: notifier.clone(),
            webhook_secret: secret.to_string(),
        });
        Harness {
            state,
            storage,
            notifier,
        }
    }

    async fn send(state: &Arc<AppState>, req: Request<Body>) -> (StatusCode, Value) {
        let response = router(state.clone()).oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness("");
        let (status, body) = send(&h.state, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["queued"], 0);
    }

    #[tokio::test]
    async fn test_create_get_and_cancel_task() {
        let h = harness("");
        let (status, body) = send(
            &h.state,
            post_json("/api/tasks", r#"{"message": "make the footer dark", "chat_ref": "chat-9"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let id = body["task_id"].as_str().unwrap().to_string();
        assert_eq!(h.state.queue.size(), 1);

        let (status, body) = send(
            &h.state,
            Request::get(format!("/api/tasks/{}", id)).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["task"]["origin_chat_ref"], "chat-9");
        assert_eq!(body["task"]["status"], "queued");

        let (_, body) = send(&h.state, post_json(&format!("/api/tasks/{}/cancel", id), "")).await;
        assert_eq!(body["cancelled"], true);
        assert_eq!(h.state.queue.size(), 0);

        let (_, body) = send(
            &h.state,
            Request::get("/api/tasks?limit=5").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_empty_message_and_unknown_task() {
        let h = harness("");
        let (status, _) = send(&h.state, post_json("/api/tasks", r#"{"message": "  "}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &h.state,
            Request::get("/api/tasks/nope").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_webhook_correlates_and_notifies() {
        let h = harness("");
        let task = Task {
            status: TaskStatus::Completed,
            ..Task::with_id("t-1".into(), "change", "chat-1", "msg")
        };
        h.storage.save_task(&task).unwrap();
        h.storage
            .save_task_result(&TaskResult {
                success: true,
                error: None,
                commit_hash: Some("abc123".to_string()),
                ..TaskResult::failed("t-1".into(), "")
            })
            .unwrap();

        let (status, body) = send(
            &h.state,
            post_json(
                "/webhook/deploy/custom",
                r#"{"status": "success", "commit_hash": "abc123", "url": "https://x.app"}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["task_id"], "t-1");
        assert_eq!(body["status"], "success");

        let deploys = h.notifier.deploys();
        assert_eq!(deploys.len(), 1);
        assert_eq!(deploys[0].status, DeployStatus::Success);
        assert_eq!(deploys[0].task_origin_ref, "chat-1");
    }

    #[tokio::test]
    async fn test_webhook_signature_required_when_configured() {
        let h = harness("s3cret");
        let body = r#"{"status": "building"}"#;

        let (status, _) = send(&h.state, post_json("/webhook/deploy/custom", body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut bad = post_json("/webhook/deploy/custom", body);
        bad.headers_mut()
            .insert("x-webhook-signature", "deadbeef".parse().unwrap());
        let (status, _) = send(&h.state, bad).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut good = post_json("/webhook/deploy/custom", body);
        let signature = format!("sha256={}", sign(body.as_bytes(), "s3cret"));
        good.headers_mut()
            .insert("x-hub-signature-256", signature.parse().unwrap());
        let (status, response) = send(&h.state, good).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["status"], "building");
        assert!(response.get("task_id").is_none());
        assert!(h.notifier.deploys().is_empty());
    }
}
