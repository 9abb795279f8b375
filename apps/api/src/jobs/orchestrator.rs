//! Job Orchestrator — runs the search pipeline and publishes its progress.
//!
//! Flow: validate → (inline | queue) → scrape → [analyze] → sanitize →
//!       export CSV → build result → `complete`.
//!
//! Phases and percent ranges:
//!   initializing 0 → scraping 5–50 → analyzing 50–95 → complete 100.
//! Any failure moves the task to `error` at its last percent. Both are terminal.
//!
//! Small requests without analysis run inline and return the result directly.
//! Everything else gets a task id and runs on a spawned task; the number of
//! pipelines running at once is bounded by a semaphore.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::analysis::batch::{BatchAnalyzer, BatchProgress};
use crate::config::SearchSettings;
use crate::errors::AppError;
use crate::jobs::export::{export_jobs, output_filename};
use crate::jobs::progress::ProgressStore;
use crate::jobs::provider::{JobSearchProvider, JobSearchQuery};
use crate::jobs::sanitize::sanitize_posting;
use crate::models::job::{JobListing, JobPosting};
use crate::models::profile::{CandidateProfile, SearchTerms};
use crate::models::task::{
    AnalysisProgress, AnalysisSummary, SearchParams, SearchResults, TaskPhase, TaskSnapshot,
};

const DEFAULT_SEARCH_TERM: &str = "software engineer";

const SCRAPE_START: u8 = 5;
const SCRAPE_QUERY: u8 = 15;
const SCRAPE_DONE: u8 = 40;
const SCRAPE_END: u8 = 50;
const ANALYZE_START: u8 = 55;
const ANALYZE_END: u8 = 95;

// ────────────────────────────────────────────────────────────────────────────
// Request / outcome
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub search_terms: SearchTerms,
    /// Candidate profile used for location inference and job analysis.
    #[serde(default)]
    pub keywords: CandidateProfile,
    pub desired_position: Option<String>,
    pub target_location: Option<String>,
    pub results_wanted: Option<usize>,
    /// Name of the uploaded resume; feeds the export file name.
    #[serde(default)]
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Completed(SearchResults),
    Queued { task_id: String },
}

// ────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct JobOrchestrator {
    provider: Arc<dyn JobSearchProvider>,
    analyzer: BatchAnalyzer,
    store: Arc<dyn ProgressStore>,
    search: SearchSettings,
    retention: Duration,
    pipelines: Arc<Semaphore>,
}

impl JobOrchestrator {
    pub fn new(
        provider: Arc<dyn JobSearchProvider>,
        analyzer: BatchAnalyzer,
        store: Arc<dyn ProgressStore>,
        search: SearchSettings,
        retention: Duration,
    ) -> Self {
        let pipelines = Arc::new(Semaphore::new(search.max_concurrent_pipelines.max(1)));
        Self {
            provider,
            analyzer,
            store,
            search,
            retention,
            pipelines,
        }
    }

    pub fn store(&self) -> &Arc<dyn ProgressStore> {
        &self.store
    }

    /// Pipelines currently holding a run slot.
    pub fn active_pipelines(&self) -> usize {
        self.search.max_concurrent_pipelines.max(1) - self.pipelines.available_permits()
    }

    pub async fn submit(&self, request: SearchRequest) -> Result<SubmitOutcome, AppError> {
        let results_wanted = request.results_wanted.unwrap_or(self.search.default_results);
        if results_wanted == 0 || results_wanted > self.search.max_results {
            return Err(AppError::Validation(format!(
                "results_wanted must be between 1 and {}",
                self.search.max_results
            )));
        }

        let analysis_enabled = self.analyzer.settings().enabled;
        if !analysis_enabled && results_wanted <= self.search.sync_threshold {
            info!("Running job search inline for {results_wanted} results");
            let results = self
                .run_pipeline(&request, results_wanted, &TaskReporter::inline())
                .await?;
            return Ok(SubmitOutcome::Completed(results));
        }

        let task_id = Uuid::new_v4().to_string();
        self.store
            .set(
                &task_id,
                TaskSnapshot::new(TaskPhase::Initializing, 0, "Starting job search..."),
            )
            .await;
        info!("Queued job search task {task_id} ({results_wanted} results, analysis={analysis_enabled})");

        let this = self.clone();
        let id = task_id.clone();
        tokio::spawn(async move { this.run_task(id, request, results_wanted).await });

        Ok(SubmitOutcome::Queued { task_id })
    }

    pub async fn poll(&self, task_id: &str) -> Result<TaskSnapshot, AppError> {
        self.store
            .get(task_id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Task {task_id} not found or expired")))
    }

    async fn run_task(self, task_id: String, request: SearchRequest, results_wanted: usize) {
        let reporter = Arc::new(TaskReporter::tracked(Arc::clone(&self.store), task_id.clone()));

        // Waits in `initializing` until a slot frees up.
        let permit = Arc::clone(&self.pipelines).acquire_owned().await;

        let pipeline = {
            let this = self.clone();
            let reporter = Arc::clone(&reporter);
            tokio::spawn(async move { this.run_pipeline(&request, results_wanted, &reporter).await })
        };

        let final_state = match pipeline.await {
            Ok(Ok(results)) => {
                info!("Task {task_id} complete with {} jobs", results.count);
                TaskSnapshot::completed(results)
            }
            Ok(Err(e)) => {
                error!("Task {task_id} failed: {e}");
                reporter.failure(&e.to_string())
            }
            Err(e) => {
                error!("Task {task_id} aborted: {e}");
                reporter.failure(&format!("Job search task aborted: {e}"))
            }
        };
        drop(permit);

        self.store.set(&task_id, final_state).await;
        self.store.schedule_purge(&task_id, self.retention).await;
    }

    async fn run_pipeline(
        &self,
        request: &SearchRequest,
        results_wanted: usize,
        reporter: &Arc<TaskReporter>,
    ) -> Result<SearchResults, AppError> {
        reporter
            .update(TaskPhase::Scraping, SCRAPE_START, "Preparing job search...")
            .await;

        let query = self.build_query(request, results_wanted);
        reporter
            .update(
                TaskPhase::Scraping,
                SCRAPE_QUERY,
                format!("Searching for '{}' jobs in {}...", query.search_term, query.location),
            )
            .await;

        let (mut jobs, search_error) = match self.provider.search(&query).await {
            Ok(jobs) => (jobs, None),
            Err(e) => {
                warn!("Job search failed, continuing with no results: {e}");
                (Vec::new(), Some(e.to_string()))
            }
        };

        let initial_count = jobs.len();
        if jobs.len() > results_wanted {
            info!("Provider returned {initial_count} jobs; truncating to {results_wanted}");
            jobs.truncate(results_wanted);
        }
        reporter
            .update(TaskPhase::Scraping, SCRAPE_DONE, format!("Found {} jobs", jobs.len()))
            .await;

        let analysis_enabled = self.analyzer.settings().enabled;
        let mut analysis_summary = None;
        if analysis_enabled && !jobs.is_empty() {
            reporter
                .update(TaskPhase::Scraping, SCRAPE_END, "Job search complete, preparing analysis...")
                .await;
            let (analyzed, summary) = self.analyze(jobs, &request.keywords, reporter).await;
            jobs = analyzed;
            analysis_summary = summary;
            reporter
                .update(TaskPhase::Analyzing, ANALYZE_END, "Analysis complete, saving results...")
                .await;
        } else {
            reporter
                .update(TaskPhase::Scraping, SCRAPE_END, "Saving results...")
                .await;
        }

        // The CSV keeps the raw text; only the payload is sanitized.
        let file_name = output_filename(
            &request.filename,
            request.desired_position.as_deref(),
            Local::now(),
        );
        let path = export_jobs(&self.search.results_dir, &file_name, &jobs)?;

        jobs.iter_mut().for_each(sanitize_posting);

        let listings: Vec<JobListing> = jobs
            .iter()
            .map(|job| JobListing::from_posting(job, self.search.description_max_length))
            .collect();

        Ok(SearchResults {
            count: listings.len(),
            search_params: SearchParams {
                search_term: query.search_term,
                location: query.location,
                results_wanted,
                initial_scraped_count: initial_count,
                final_returned_count: listings.len(),
            },
            jobs: listings,
            output_file: path.display().to_string(),
            analysis_enabled,
            jobs_analyzed: analysis_summary.is_some(),
            analysis_summary,
            search_error,
        })
    }

    /// Runs the analyzer on its own task so a crash inside it only costs the
    /// analysis, not the run.
    async fn analyze(
        &self,
        jobs: Vec<JobPosting>,
        profile: &CandidateProfile,
        reporter: &Arc<TaskReporter>,
    ) -> (Vec<JobPosting>, Option<AnalysisSummary>) {
        let plan = self.analyzer.plan_for(jobs.len());
        reporter
            .update(
                TaskPhase::Analyzing,
                ANALYZE_START,
                format!("Analyzing {} jobs...", plan.budget),
            )
            .await;

        let handle = {
            let analyzer = self.analyzer.clone();
            let profile = profile.clone();
            let reporter = Arc::clone(reporter);
            let input = jobs.clone();
            tokio::spawn(async move { analyzer.analyze(input, &profile, plan, reporter.as_ref()).await })
        };

        match handle.await {
            Ok(outcome) => (outcome.jobs, Some(outcome.summary)),
            Err(e) => {
                error!("Job analysis aborted, returning unanalyzed jobs: {e}");
                (jobs, None)
            }
        }
    }

    fn build_query(&self, request: &SearchRequest, results_wanted: usize) -> JobSearchQuery {
        let terms = &request.search_terms;
        let primary = terms
            .primary_search_terms
            .iter()
            .map(|t| t.trim())
            .find(|t| !t.is_empty())
            .unwrap_or(DEFAULT_SEARCH_TERM);

        let search_term = match non_blank(request.desired_position.as_deref()) {
            Some(position) if !primary.to_lowercase().contains(&position.to_lowercase()) => {
                format!("{position} {primary}")
            }
            _ => primary.to_string(),
        };

        let location = non_blank(request.target_location.as_deref())
            .or_else(|| non_blank(terms.location.as_deref()))
            .or_else(|| request.keywords.inferred_location())
            .unwrap_or(self.search.default_location.as_str())
            .to_string();

        let google_search_term = non_blank(terms.google_search_string.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{search_term} jobs near {location}"));

        JobSearchQuery {
            site_name: self.search.sites.clone(),
            search_term,
            google_search_term,
            location,
            results_wanted,
            hours_old: self.search.hours_old,
            country_indeed: self.search.default_country.clone(),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("not specified"))
}

// ────────────────────────────────────────────────────────────────────────────
// Progress reporting
// ────────────────────────────────────────────────────────────────────────────

/// Single writer of one task's progress. Percent never goes backwards.
/// Inline runs use a reporter with no store behind it.
struct TaskReporter {
    target: Option<(Arc<dyn ProgressStore>, String)>,
    percent: AtomicU8,
}

impl TaskReporter {
    fn inline() -> Arc<Self> {
        Arc::new(Self {
            target: None,
            percent: AtomicU8::new(0),
        })
    }

    fn tracked(store: Arc<dyn ProgressStore>, task_id: String) -> Self {
        Self {
            target: Some((store, task_id)),
            percent: AtomicU8::new(0),
        }
    }

    async fn update(&self, phase: TaskPhase, percent: u8, details: impl Into<String>) {
        self.publish(TaskSnapshot::new(phase, percent, details)).await;
    }

    async fn publish(&self, mut snapshot: TaskSnapshot) {
        let previous = self.percent.fetch_max(snapshot.percent, Ordering::SeqCst);
        snapshot.percent = snapshot.percent.max(previous);

        if let Some((store, task_id)) = &self.target {
            store.set(task_id, snapshot).await;
        }
    }

    fn failure(&self, message: &str) -> TaskSnapshot {
        TaskSnapshot::new(
            TaskPhase::Error,
            self.percent.load(Ordering::SeqCst),
            format!("Error: {message}"),
        )
    }
}

#[async_trait]
impl BatchProgress for TaskReporter {
    async fn batch_completed(&self, progress: AnalysisProgress) {
        let span = usize::from(ANALYZE_END - ANALYZE_START);
        let done = progress.completed_batches.min(progress.total_batches);
        let percent = ANALYZE_START as usize + span * done / progress.total_batches.max(1);

        self.publish(
            TaskSnapshot::new(
                TaskPhase::Analyzing,
                percent as u8,
                format!(
                    "Analyzed {} of {} batches",
                    progress.completed_batches, progress.total_batches
                ),
            )
            .with_analysis_progress(progress),
        )
        .await;
    }
}
