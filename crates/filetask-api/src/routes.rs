//! HTTP route definitions and handlers.
//!
//! ```text
//! GET    /health
//!
//! GET    /tasks                  list (TaskListParams)
//! POST   /tasks                  create
//! GET    /tasks/{id}
//! PATCH  /tasks/{id}             update (UpdateTaskRequest)
//! DELETE /tasks/{id}
//! POST   /tasks/{id}/toggle      flip enabled
//! POST   /tasks/{id}/reset       clear running flag and last run time
//! POST   /tasks/{id}/execute     start a run now
//! POST   /tasks/{id}/stop        request a stop
//! GET    /tasks/{id}/status      live job or latest log row
//! GET    /tasks/{id}/logs        execution logs (LogListParams)
//! GET    /tasks/{id}/events      newline-delimited JSON task events
//! GET    /logs/stats             per-status log counts
//!
//! GET    /history                file history (HistoryParams)
//! DELETE /history                clear all history
//! POST   /history/delete         delete rows by id
//!
//! GET    /invalid-strm           invalid .strm files (InvalidListParams)
//! GET    /invalid-strm/stats
//! GET    /invalid-strm/{id}
//! POST   /invalid-strm/check     run a validity check
//! POST   /invalid-strm/status    set review status of rows
//! POST   /invalid-strm/delete    delete rows by id
//! ```

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use filetask_engine::{ChannelHandler, SubscriptionId, TaskOrchestrator};
use filetask_store::{DetectionType, NewTask, StoreError, TaskId};
use tracing::{debug, warn};

use crate::dto::{
    CheckRequest, CountResponse, ExecuteResponse, HealthResponse, HistoryParams, IdsRequest,
    InvalidListParams, LogListParams, RangeParams, SinceParams, StatusChangeRequest,
    TaskListParams, UpdateTaskRequest,
};
use crate::error::ApiError;
use crate::state::AppState;

type ApiResult<T> = Result<T, ApiError>;
type SharedState = State<Arc<AppState>>;

/// Build the control API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/{id}",
            get(get_task).patch(update_task).delete(delete_task),
        )
        .route("/tasks/{id}/toggle", post(toggle_task))
        .route("/tasks/{id}/reset", post(reset_task))
        .route("/tasks/{id}/execute", post(execute_task))
        .route("/tasks/{id}/stop", post(stop_task))
        .route("/tasks/{id}/status", get(task_status))
        .route("/tasks/{id}/logs", get(task_logs))
        .route("/tasks/{id}/events", get(task_events))
        .route("/logs/stats", get(log_stats))
        .route("/history", get(list_history).delete(clear_history))
        .route("/history/delete", post(delete_history))
        .route("/invalid-strm", get(list_invalid))
        .route("/invalid-strm/stats", get(invalid_stats))
        .route("/invalid-strm/check", post(check_invalid))
        .route("/invalid-strm/status", post(mark_invalid))
        .route("/invalid-strm/delete", post(delete_invalid))
        .route("/invalid-strm/{id}", get(get_invalid))
        .with_state(state)
}

fn require_ids(ids: &[i64]) -> ApiResult<()> {
    if ids.is_empty() {
        return Err(ApiError::BadRequest("ids must not be empty".to_string()));
    }
    Ok(())
}

async fn health(State(state): SharedState) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_jobs: state.orchestrator.queue().active_count(),
    })
}

async fn list_tasks(
    State(state): SharedState,
    Query(params): Query<TaskListParams>,
) -> ApiResult<impl IntoResponse> {
    let page = state.orchestrator.list_tasks(&params.into_query()).await?;
    Ok(Json(page))
}

async fn create_task(
    State(state): SharedState,
    Json(def): Json<NewTask>,
) -> ApiResult<impl IntoResponse> {
    let task = state.orchestrator.create(def).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn get_task(State(state): SharedState, Path(id): Path<TaskId>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.orchestrator.find_task(id).await?))
}

async fn update_task(
    State(state): SharedState,
    Path(id): Path<TaskId>,
    Json(request): Json<UpdateTaskRequest>,
) -> ApiResult<impl IntoResponse> {
    let patch = request.into_patch();
    if patch.is_empty() {
        return Err(ApiError::BadRequest(
            "nothing to update; pass at least one field".to_string(),
        ));
    }
    Ok(Json(state.orchestrator.update(id, patch).await?))
}

async fn delete_task(State(state): SharedState, Path(id): Path<TaskId>) -> ApiResult<StatusCode> {
    state.orchestrator.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_task(State(state): SharedState, Path(id): Path<TaskId>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.orchestrator.toggle_enabled(id).await?))
}

async fn reset_task(State(state): SharedState, Path(id): Path<TaskId>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.orchestrator.reset_status(id).await?))
}

async fn execute_task(
    State(state): SharedState,
    Path(id): Path<TaskId>,
) -> ApiResult<impl IntoResponse> {
    let handle = state.orchestrator.execute(id).await?;
    let body = ExecuteResponse {
        task_id: handle.task_id,
        job_id: handle.job_id,
    };
    Ok((StatusCode::ACCEPTED, Json(body)))
}

async fn stop_task(State(state): SharedState, Path(id): Path<TaskId>) -> ApiResult<StatusCode> {
    state.orchestrator.stop(id).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn task_status(State(state): SharedState, Path(id): Path<TaskId>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.orchestrator.get_task_status(id).await?))
}

async fn task_logs(
    State(state): SharedState,
    Path(id): Path<TaskId>,
    Query(params): Query<LogListParams>,
) -> ApiResult<impl IntoResponse> {
    // 404 for an unknown task rather than an empty page
    state.orchestrator.find_task(id).await?;
    Ok(Json(state.orchestrator.list_logs(&params.into_query(id)).await?))
}

/// Drops the bus subscription when the response body is dropped.
struct Subscription {
    orchestrator: Arc<TaskOrchestrator>,
    task_id: TaskId,
    id: SubscriptionId,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.orchestrator.unsubscribe_progress(self.task_id, self.id);
        debug!(task_id = self.task_id, "Event stream closed");
    }
}

/// Stream the task's events as newline-delimited JSON until the client
/// disconnects or the engine shuts down. The subscription is in place
/// before the response head is sent.
async fn task_events(State(state): SharedState, Path(id): Path<TaskId>) -> ApiResult<Response> {
    state.orchestrator.find_task(id).await?;
    let (handler, events) = ChannelHandler::channel();
    let subscription = Subscription {
        orchestrator: state.orchestrator.clone(),
        task_id: id,
        id: state.orchestrator.subscribe_progress(id, handler),
    };

    let lines = futures::stream::unfold((events, subscription), |(mut events, subscription)| async move {
        loop {
            let event = events.recv().await?;
            match serde_json::to_vec(&event) {
                Ok(mut line) => {
                    line.push(b'\n');
                    return Some((Ok::<_, Infallible>(line), (events, subscription)));
                }
                Err(e) => warn!(task_id = event.task_id(), error = %e, "Dropping unencodable event"),
            }
        }
    });

    Ok((
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(lines),
    )
        .into_response())
}

async fn log_stats(
    State(state): SharedState,
    Query(params): Query<SinceParams>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.orchestrator.log_stats(params.since).await?))
}

async fn list_history(
    State(state): SharedState,
    Query(params): Query<HistoryParams>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.history.list(&params.into_query()).await?))
}

async fn clear_history(State(state): SharedState) -> ApiResult<Json<CountResponse>> {
    let count = state.history.clear_all().await?;
    Ok(Json(CountResponse { count }))
}

async fn delete_history(
    State(state): SharedState,
    Json(request): Json<IdsRequest>,
) -> ApiResult<Json<CountResponse>> {
    require_ids(&request.ids)?;
    let count = state.history.bulk_delete(&request.ids).await?;
    Ok(Json(CountResponse { count }))
}

async fn list_invalid(
    State(state): SharedState,
    Query(params): Query<InvalidListParams>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.invalid.list_invalid(&params.into_query()).await?))
}

async fn invalid_stats(
    State(state): SharedState,
    Query(range): Query<RangeParams>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.invalid.invalid_stats(range.from, range.to).await?))
}

async fn get_invalid(State(state): SharedState, Path(id): Path<i64>) -> ApiResult<impl IntoResponse> {
    let record = state
        .invalid
        .find_invalid(id)
        .await?
        .ok_or(StoreError::NotFound {
            kind: "invalid strm file",
            id,
        })?;
    Ok(Json(record))
}

async fn check_invalid(
    State(state): SharedState,
    Json(request): Json<CheckRequest>,
) -> ApiResult<impl IntoResponse> {
    if let Some(task_id) = request.task_id {
        state.orchestrator.find_task(task_id).await?;
    }
    let detection = request.detection_type.unwrap_or(DetectionType::Manual);
    Ok(Json(state.checker.check(request.task_id, detection).await?))
}

async fn mark_invalid(
    State(state): SharedState,
    Json(request): Json<StatusChangeRequest>,
) -> ApiResult<Json<CountResponse>> {
    require_ids(&request.ids)?;
    let count = state
        .invalid
        .set_status(&request.ids, request.status, request.note)
        .await?;
    Ok(Json(CountResponse { count }))
}

async fn delete_invalid(
    State(state): SharedState,
    Json(request): Json<IdsRequest>,
) -> ApiResult<Json<CountResponse>> {
    require_ids(&request.ids)?;
    let count = state.invalid.delete_invalid(&request.ids).await?;
    Ok(Json(CountResponse { count }))
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
