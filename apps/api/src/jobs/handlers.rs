//! Axum route handlers for the Jobs API.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::AppError;
use crate::jobs::orchestrator::{SearchRequest, SubmitOutcome};
use crate::models::task::TaskSnapshot;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    pub task_id: String,
    pub status: &'static str,
    pub progress_url: String,
}

/// POST /api/v1/jobs/search
///
/// Returns the full result (200) for small runs without analysis, otherwise
/// a task id (202) to poll.
pub async fn handle_search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Response, AppError> {
    match state.orchestrator.submit(request).await? {
        SubmitOutcome::Completed(results) => Ok(Json(results).into_response()),
        SubmitOutcome::Queued { task_id } => Ok((
            StatusCode::ACCEPTED,
            Json(QueuedResponse {
                progress_url: format!("/api/v1/jobs/progress/{task_id}"),
                task_id,
                status: "processing",
            }),
        )
            .into_response()),
    }
}

/// GET /api/v1/jobs/progress/:task_id
pub async fn handle_progress(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskSnapshot>, AppError> {
    let snapshot = state.orchestrator.poll(&task_id).await?;
    Ok(Json(snapshot))
}
