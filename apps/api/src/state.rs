use std::sync::Arc;

use crate::cache::ContentCache;
use crate::config::Config;
use crate::jobs::orchestrator::JobOrchestrator;
use crate::profile::ProfileExtractor;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: JobOrchestrator,
    pub profiles: ProfileExtractor,
    /// Same cache instance the analyzer and profile extractor write to.
    pub cache: Arc<ContentCache>,
    pub config: Config,
}
