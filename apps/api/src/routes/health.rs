use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Returns service status, the active progress backend and pipeline load.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "seekr-api",
        "progress_backend": state.orchestrator.store().backend(),
        "active_pipelines": state.orchestrator.active_pipelines(),
        "analysis_enabled": state.config.analysis.enabled,
    }))
}
