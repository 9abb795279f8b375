//! Operator endpoints for inspecting and clearing the content cache.

use axum::{extract::State, Json};

use crate::cache::{CacheInfo, ClearStats};
use crate::state::AppState;

/// GET /api/v1/cache
pub async fn handle_cache_info(State(state): State<AppState>) -> Json<CacheInfo> {
    Json(state.cache.info())
}

/// POST /api/v1/cache/clear
pub async fn handle_cache_clear(State(state): State<AppState>) -> Json<ClearStats> {
    Json(state.cache.clear())
}
