mod analysis;
mod cache;
mod config;
mod errors;
mod jobs;
mod llm_client;
mod models;
mod profile;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::analysis::batch::BatchAnalyzer;
use crate::analysis::oracle::LlmJobOracle;
use crate::cache::ContentCache;
use crate::config::Config;
use crate::jobs::orchestrator::JobOrchestrator;
use crate::jobs::progress::{connect_progress_store, spawn_reaper};
use crate::jobs::provider::HttpJobSearchProvider;
use crate::llm_client::LlmClient;
use crate::profile::ProfileExtractor;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Seekr API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize LLM client
    let llm = LlmClient::new(config.anthropic_api_key.clone());
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    // Content cache shared by profile extraction and job analysis
    let cache = Arc::new(ContentCache::new(&config.cache_dir, config.cache_ttl));
    info!(
        "Content cache at {} (ttl {:?})",
        cache.directory().display(),
        config.cache_ttl
    );

    // Progress store: Redis if reachable, in-memory otherwise
    let progress = connect_progress_store(&config.progress).await;
    let shutdown = CancellationToken::new();
    let reaper = spawn_reaper(
        Arc::clone(&progress),
        config.progress.reaper_interval,
        shutdown.clone(),
    );

    let oracle = Arc::new(LlmJobOracle::new(llm.clone(), config.analysis.analyze_salary));
    let analyzer = BatchAnalyzer::new(oracle, Arc::clone(&cache), config.analysis.clone());
    info!(
        "Job analysis {} (batch size {}, workers {}, max jobs {})",
        if config.analysis.enabled { "enabled" } else { "disabled" },
        config.analysis.batch_size,
        config.analysis.workers,
        config.analysis.max_jobs
    );

    let orchestrator = JobOrchestrator::new(
        Arc::new(HttpJobSearchProvider::new(&config.job_search_url)),
        analyzer,
        progress,
        config.search.clone(),
        config.progress.retention,
    );

    // Build app state
    let state = AppState {
        orchestrator,
        profiles: ProfileExtractor::new(llm, Arc::clone(&cache)),
        cache,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    reaper.await?;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
