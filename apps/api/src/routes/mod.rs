pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::cache::handlers as cache_handlers;
use crate::jobs::handlers as job_handlers;
use crate::profile::handlers as profile_handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Profile API
        .route(
            "/api/v1/profile/extract",
            post(profile_handlers::handle_extract),
        )
        // Jobs API
        .route("/api/v1/jobs/search", post(job_handlers::handle_search))
        .route(
            "/api/v1/jobs/progress/:task_id",
            get(job_handlers::handle_progress),
        )
        // Cache administration
        .route("/api/v1/cache", get(cache_handlers::handle_cache_info))
        .route(
            "/api/v1/cache/clear",
            post(cache_handlers::handle_cache_clear),
        )
        .with_state(state)
}
