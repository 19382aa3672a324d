//! HTTP boundary for the presentation layer.
//!
//! A thin axum REST surface over the mutation service and the plan
//! runner. The owner scope comes from the `x-owner-id` header, supplied
//! by whatever authentication sits in front of this service; requests
//! without it see an empty task list and no-op mutations.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::db::Database;
use crate::error::{ErrorCode, StoreError};
use crate::plan::run_plan;
use crate::service::{MutationOutcome, MutationService};
use crate::types::{OwnerScope, Subtask, SubtaskPatch, Task, TaskPatch, TaskStatus};

/// How long a change long-poll waits before answering "nothing new".
const CHANGES_POLL_TIMEOUT: Duration = Duration::from_secs(25);

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    db: Arc<Database>,
    plan_delay: Duration,
}

impl AppState {
    pub fn new(db: Arc<Database>, plan_delay: Duration) -> Self {
        Self { db, plan_delay }
    }

    fn service(&self, owner: OwnerScope) -> MutationService<Database> {
        MutationService::new(Arc::clone(&self.db), owner)
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/{id}", patch(update_task).delete(delete_task))
        .route("/api/tasks/{id}/move", post(move_task))
        .route("/api/tasks/{id}/subtasks", post(add_subtask).put(reorder_subtasks))
        .route(
            "/api/tasks/{id}/subtasks/{subtask_id}",
            patch(update_subtask).delete(delete_subtask),
        )
        .route("/api/tasks/{id}/subtasks/{subtask_id}/toggle", post(toggle_subtask))
        .route("/api/plan", post(plan))
        .route("/api/changes", get(changes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

/// Bind and serve until shutdown.
pub async fn serve(state: AppState, bind: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = bind.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn owner_scope(headers: &HeaderMap) -> OwnerScope {
    headers
        .get("x-owner-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(OwnerScope::user)
        .unwrap_or_else(OwnerScope::anonymous)
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = match self.code {
            ErrorCode::TaskNotFound | ErrorCode::SubtaskNotFound => StatusCode::NOT_FOUND,
            ErrorCode::MissingRequiredField | ErrorCode::InvalidFieldValue => {
                StatusCode::BAD_REQUEST
            }
            ErrorCode::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn list_tasks(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Task>>, StoreError> {
    match owner_scope(&headers).id() {
        Some(owner_id) => Ok(Json(state.db.list_tasks(owner_id)?)),
        None => Ok(Json(Vec::new())),
    }
}

#[derive(Deserialize)]
struct CreateTaskRequest {
    title: String,
    #[serde(default)]
    initial_subtask: Option<String>,
}

async fn create_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateTaskRequest>,
) -> Result<Response, StoreError> {
    if request.title.trim().is_empty() {
        return Err(StoreError::missing_field("title"));
    }

    let service = state.service(owner_scope(&headers));
    match service
        .add_task(&request.title, request.initial_subtask.as_deref())
        .await?
    {
        Some(task) => Ok((StatusCode::CREATED, Json(task)).into_response()),
        None => Ok(outcome_response(MutationOutcome::NoOwner)),
    }
}

async fn update_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<TaskPatch>,
) -> Result<Response, StoreError> {
    let service = state.service(owner_scope(&headers));
    let outcome = service.update_task(&task_id, patch).await?;
    Ok(outcome_response(outcome))
}

async fn delete_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, StoreError> {
    let service = state.service(owner_scope(&headers));
    let outcome = service.delete_task(&task_id).await?;
    Ok(outcome_response(outcome))
}

#[derive(Deserialize)]
struct MoveTaskRequest {
    status: TaskStatus,
}

async fn move_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<MoveTaskRequest>,
) -> Result<Response, StoreError> {
    let service = state.service(owner_scope(&headers));
    let outcome = service.move_task(&task_id, request.status).await?;
    Ok(outcome_response(outcome))
}

#[derive(Deserialize)]
struct AddSubtaskRequest {
    title: String,
    #[serde(default)]
    date: Option<DateTime<Utc>>,
}

async fn add_subtask(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<AddSubtaskRequest>,
) -> Result<Response, StoreError> {
    let service = state.service(owner_scope(&headers));
    let outcome = service
        .add_subtask(&task_id, &request.title, request.date)
        .await?;
    Ok(outcome_response(outcome))
}

async fn toggle_subtask(
    State(state): State<AppState>,
    Path((task_id, subtask_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, StoreError> {
    let service = state.service(owner_scope(&headers));
    let outcome = service.toggle_subtask(&task_id, &subtask_id).await?;
    Ok(outcome_response(outcome))
}

async fn update_subtask(
    State(state): State<AppState>,
    Path((task_id, subtask_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(patch): Json<SubtaskPatch>,
) -> Result<Response, StoreError> {
    let service = state.service(owner_scope(&headers));
    let outcome = service.update_subtask(&task_id, &subtask_id, patch).await?;
    Ok(outcome_response(outcome))
}

async fn delete_subtask(
    State(state): State<AppState>,
    Path((task_id, subtask_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, StoreError> {
    let service = state.service(owner_scope(&headers));
    let outcome = service.delete_subtask(&task_id, &subtask_id).await?;
    Ok(outcome_response(outcome))
}

#[derive(Deserialize)]
struct ReorderSubtasksRequest {
    subtasks: Vec<Subtask>,
}

async fn reorder_subtasks(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ReorderSubtasksRequest>,
) -> Result<Response, StoreError> {
    let service = state.service(owner_scope(&headers));
    let outcome = service.reorder_subtasks(&task_id, request.subtasks).await?;
    Ok(outcome_response(outcome))
}

/// Per-task view of a reconciliation pass for the wire.
#[derive(Serialize)]
struct PlanResponse {
    scanned: usize,
    updated: Vec<String>,
    skipped: Vec<String>,
    missing: Vec<String>,
    failures: Vec<PlanFailure>,
}

#[derive(Serialize)]
struct PlanFailure {
    task_id: String,
    error: StoreError,
}

async fn plan(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PlanResponse>, StoreError> {
    // Optional UX pacing, applied at the boundary; the optimizer
    // itself never sleeps.
    if !state.plan_delay.is_zero() {
        tokio::time::sleep(state.plan_delay).await;
    }

    let service = state.service(owner_scope(&headers));
    let outcome = run_plan(state.db.as_ref(), &service, Utc::now()).await?;

    Ok(Json(PlanResponse {
        scanned: outcome.scanned,
        updated: outcome.report.updated,
        skipped: outcome.report.skipped,
        missing: outcome.report.missing,
        failures: outcome
            .report
            .failures
            .into_iter()
            .map(|(task_id, error)| PlanFailure { task_id, error })
            .collect(),
    }))
}

#[derive(Serialize)]
struct ChangesResponse {
    /// Whether a change event arrived before the poll timed out.
    changed: bool,
    /// Fresh full snapshot, authoritative at time of response.
    tasks: Vec<Task>,
}

/// Long-poll for changes to the caller's task set. Answers with a full
/// snapshot either when a change event lands or when the poll times out.
async fn changes(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ChangesResponse>, StoreError> {
    let owner = owner_scope(&headers);

    let changed = match owner.id() {
        None => false,
        Some(owner_id) => {
            let mut rx = state.db.event_receiver();
            tokio::time::timeout(CHANGES_POLL_TIMEOUT, async {
                loop {
                    match rx.recv().await {
                        Ok(event) if event.owner_id == owner_id => break true,
                        Ok(_) => {}
                        // Missed events collapse into the snapshot below.
                        Err(broadcast::error::RecvError::Lagged(_)) => break true,
                        Err(broadcast::error::RecvError::Closed) => break false,
                    }
                }
            })
            .await
            .unwrap_or(false)
        }
    };

    let tasks = match owner.id() {
        Some(owner_id) => state.db.list_tasks(owner_id)?,
        None => Vec::new(),
    };

    Ok(Json(ChangesResponse { changed, tasks }))
}

fn outcome_response(outcome: MutationOutcome) -> Response {
    match outcome {
        MutationOutcome::Applied => {
            (StatusCode::OK, Json(serde_json::json!({ "outcome": "applied" }))).into_response()
        }
        // Faithful to the store contract: a missing task is a tolerated
        // no-op, reported rather than raised.
        MutationOutcome::MissingTask => (
            StatusCode::OK,
            Json(serde_json::json!({ "outcome": "missing_task" })),
        )
            .into_response(),
        MutationOutcome::NoOwner => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "outcome": "no_owner" })),
        )
            .into_response(),
    }
}
