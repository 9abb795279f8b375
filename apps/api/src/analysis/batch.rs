//! Batch Analyzer: augments scraped postings with oracle-provided analysis.
//!
//! Flow: cap by budget → partition into batches → per batch (cache → oracle)
//!       → merge in input order → append skipped overflow → optional ranking.
//!
//! A failing batch never fails the run: its postings get default analysis and
//! the remaining batches proceed. Output always has exactly as many postings
//! as the input.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::analysis::oracle::{BatchAnalysis, JobAnalysisOracle, JobAnalysisRecord, JobDigest};
use crate::cache::ContentCache;
use crate::config::AnalysisSettings;
use crate::errors::AppError;
use crate::models::job::{truncate_chars, JobAnalysis, JobPosting};
use crate::models::profile::CandidateProfile;
use crate::models::task::{AnalysisProgress, AnalysisSummary};

/// Cache operation name for batch analyses.
pub const ANALYZE_BATCH_OPERATION: &str = "analyze_jobs_batch";
const JOB_TEXT_DESCRIPTION_CHARS: usize = 1000;
const EXPLANATION_MAX_CHARS: usize = 500;
const LIST_ITEM_MAX_CHARS: usize = 100;

// ────────────────────────────────────────────────────────────────────────────
// Plan and outcome
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    Sequential,
    Parallel { workers: usize },
}

/// How one analysis run is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisPlan {
    pub batch_size: usize,
    pub mode: AnalysisMode,
    /// Maximum number of postings sent to the oracle.
    pub budget: usize,
    pub rank_by_similarity: bool,
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub jobs: Vec<JobPosting>,
    pub summary: AnalysisSummary,
    pub total_batches: usize,
}

/// Receives a notification after each batch finishes (successfully or not).
#[async_trait]
pub trait BatchProgress: Send + Sync {
    async fn batch_completed(&self, progress: AnalysisProgress);
}

pub struct NoProgress;

#[async_trait]
impl BatchProgress for NoProgress {
    async fn batch_completed(&self, _progress: AnalysisProgress) {}
}

// ────────────────────────────────────────────────────────────────────────────
// Analyzer
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct BatchAnalyzer {
    oracle: Arc<dyn JobAnalysisOracle>,
    cache: Arc<ContentCache>,
    settings: AnalysisSettings,
}

impl BatchAnalyzer {
    pub fn new(
        oracle: Arc<dyn JobAnalysisOracle>,
        cache: Arc<ContentCache>,
        settings: AnalysisSettings,
    ) -> Self {
        Self {
            oracle,
            cache,
            settings,
        }
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// Plan derived from configuration for `job_count` postings.
    /// The configured cap always wins over the number of postings.
    pub fn plan_for(&self, job_count: usize) -> AnalysisPlan {
        let budget = self.settings.max_jobs.min(job_count);
        let batch_size = self.settings.batch_size.max(1);
        let mode = if self.settings.parallel && batch_count(budget, batch_size) > 1 {
            AnalysisMode::Parallel {
                workers: self.settings.workers.max(1),
            }
        } else {
            AnalysisMode::Sequential
        };

        AnalysisPlan {
            batch_size,
            mode,
            budget,
            rank_by_similarity: self.settings.rank_by_similarity,
        }
    }

    pub async fn analyze(
        &self,
        mut jobs: Vec<JobPosting>,
        profile: &CandidateProfile,
        plan: AnalysisPlan,
        progress: &dyn BatchProgress,
    ) -> AnalysisOutcome {
        let total = jobs.len();
        let budget = plan.budget.min(total);
        let overflow = jobs.split_off(budget);
        let batches = partition(jobs, plan.batch_size);
        let total_batches = batches.len();
        let candidate: Arc<str> = profile.summary().into();

        info!(
            "Analyzing {budget} of {total} jobs in {total_batches} batches ({:?})",
            plan.mode
        );

        let mut analyzed = match plan.mode {
            AnalysisMode::Parallel { workers } if total_batches > 1 => {
                self.run_parallel(batches, candidate, workers, progress).await
            }
            _ => self.run_sequential(batches, candidate, progress).await,
        };

        if !overflow.is_empty() {
            info!(
                "Appending {} jobs beyond the analysis budget of {budget}",
                overflow.len()
            );
            let reason = format!("Not analyzed: analysis budget of {budget} jobs reached");
            analyzed.extend(
                overflow
                    .into_iter()
                    .map(|job| job.with_analysis(JobAnalysis::skipped(reason.clone()))),
            );
        }

        if plan.rank_by_similarity {
            rank_by_similarity(&mut analyzed);
        }

        debug_assert_eq!(analyzed.len(), total);
        let summary = summarize(&analyzed);
        info!(
            "Analysis finished: {}/{} analyzed, {} with salary",
            summary.analyzed_count, summary.total_count, summary.salary_extracted_count
        );

        AnalysisOutcome {
            jobs: analyzed,
            summary,
            total_batches,
        }
    }

    async fn run_sequential(
        &self,
        batches: Vec<Vec<JobPosting>>,
        candidate: Arc<str>,
        progress: &dyn BatchProgress,
    ) -> Vec<JobPosting> {
        let total_batches = batches.len();
        let mut out = Vec::with_capacity(batches.iter().map(Vec::len).sum());

        for (idx, batch) in batches.into_iter().enumerate() {
            if idx > 0 && !self.settings.request_delay.is_zero() {
                tokio::time::sleep(self.settings.request_delay).await;
            }

            let batch_size = batch.len();
            match analyze_one(
                self.oracle.as_ref(),
                &self.cache,
                &batch,
                &candidate,
                self.settings.analyze_salary,
            )
            .await
            {
                Ok(jobs) => out.extend(jobs),
                Err(e) => {
                    error!("Batch {} of {total_batches} failed: {e}", idx + 1);
                    out.extend(with_default_analysis(batch));
                }
            }

            progress
                .batch_completed(AnalysisProgress {
                    completed_batches: idx + 1,
                    total_batches,
                    current_batch_size: Some(batch_size),
                })
                .await;
        }

        out
    }

    async fn run_parallel(
        &self,
        batches: Vec<Vec<JobPosting>>,
        candidate: Arc<str>,
        workers: usize,
        progress: &dyn BatchProgress,
    ) -> Vec<JobPosting> {
        let total_batches = batches.len();
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let mut set = JoinSet::new();

        for (idx, batch) in batches.iter().cloned().enumerate() {
            let oracle = Arc::clone(&self.oracle);
            let cache = Arc::clone(&self.cache);
            let candidate = Arc::clone(&candidate);
            let semaphore = Arc::clone(&semaphore);
            let delay = self.settings.request_delay;
            let analyze_salary = self.settings.analyze_salary;

            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let result =
                    analyze_one(oracle.as_ref(), &cache, &batch, &candidate, analyze_salary).await;
                (idx, result)
            });
        }

        let mut slots: Vec<Option<Vec<JobPosting>>> = vec![None; total_batches];
        let mut completed = 0;

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, Ok(jobs))) => slots[idx] = Some(jobs),
                Ok((idx, Err(e))) => error!("Batch {} of {total_batches} failed: {e}", idx + 1),
                Err(e) => error!("Analysis worker aborted: {e}"),
            }
            completed += 1;
            progress
                .batch_completed(AnalysisProgress {
                    completed_batches: completed,
                    total_batches,
                    current_batch_size: None,
                })
                .await;
        }

        batches
            .into_iter()
            .zip(slots)
            .flat_map(|(batch, slot)| slot.unwrap_or_else(|| with_default_analysis(batch)))
            .collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Per-batch work
// ────────────────────────────────────────────────────────────────────────────

async fn analyze_one(
    oracle: &dyn JobAnalysisOracle,
    cache: &Arc<ContentCache>,
    batch: &[JobPosting],
    candidate: &str,
    analyze_salary: bool,
) -> Result<Vec<JobPosting>, AppError> {
    let digests: Vec<JobDigest> = batch
        .iter()
        .enumerate()
        .map(|(index, job)| JobDigest {
            index,
            text: job_text(job),
        })
        .collect();

    let key = batch_cache_key(&digests, candidate, analyze_salary)?;

    let response = match cache.fetch::<BatchAnalysis>(&key).await {
        Some(cached) => {
            debug!("Using cached analysis for batch of {}", batch.len());
            cached
        }
        None => {
            let fresh = oracle.analyze_batch(&digests, candidate).await?;
            cache.store(&key, &fresh).await;
            fresh
        }
    };

    Ok(apply_analysis(batch, &response, analyze_salary))
}

fn batch_cache_key(
    digests: &[JobDigest],
    candidate: &str,
    analyze_salary: bool,
) -> Result<String, AppError> {
    let texts: Vec<&str> = digests.iter().map(|d| d.text.as_str()).collect();
    let content = serde_json::to_string(&texts)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Serializing batch failed: {e}")))?;
    let salary_flag = if analyze_salary { "true" } else { "false" };

    Ok(ContentCache::key(
        ANALYZE_BATCH_OPERATION,
        &content,
        &[("resume_summary", candidate), ("analyze_salary", salary_flag)],
    ))
}

/// Text sent to the oracle for one posting.
pub fn job_text(job: &JobPosting) -> String {
    let field = |value: &Option<String>| value.clone().unwrap_or_else(|| "N/A".to_string());
    format!(
        "Title: {}\nCompany: {}\nLocation: {}\nDescription: {}",
        field(&job.title),
        field(&job.company),
        field(&job.location),
        truncate_chars(
            job.description.as_deref().unwrap_or_default(),
            JOB_TEXT_DESCRIPTION_CHARS
        ),
    )
}

fn apply_analysis(batch: &[JobPosting], response: &BatchAnalysis, analyze_salary: bool) -> Vec<JobPosting> {
    batch
        .iter()
        .enumerate()
        .map(|(index, job)| {
            let analysis = match response.record_for(index) {
                Some(record) => analysis_from_record(record, analyze_salary),
                None => {
                    warn!("No analysis record returned for job {index} in batch");
                    JobAnalysis {
                        analyzed: true,
                        ..JobAnalysis::default()
                    }
                }
            };
            job.clone().with_analysis(analysis)
        })
        .collect()
}

fn analysis_from_record(record: &JobAnalysisRecord, analyze_salary: bool) -> JobAnalysis {
    let mut analysis = JobAnalysis {
        analyzed: true,
        similarity_score: normalize_score(record.similarity_score),
        key_matches: clean_items(&record.key_matches),
        missing_requirements: clean_items(&record.missing_requirements),
        ..JobAnalysis::default()
    };

    if let Some(explanation) = record
        .similarity_explanation
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
    {
        analysis.similarity_explanation = truncate_chars(explanation, EXPLANATION_MAX_CHARS);
    }

    if analyze_salary {
        analysis.salary_min_extracted = record.salary_min.filter(|v| v.is_finite() && *v > 0.0);
        analysis.salary_max_extracted = record.salary_max.filter(|v| v.is_finite() && *v > 0.0);
        analysis.salary_confidence = record
            .salary_confidence
            .filter(|c| c.is_finite())
            .map_or(0.0, |c| c.clamp(0.0, 1.0));
    }

    analysis
}

/// Maps an oracle score into `[0, 1]`. Scores on a ten-point scale are rescaled.
pub fn normalize_score(raw: Option<f64>) -> f64 {
    match raw {
        Some(score) if score.is_finite() => {
            let score = if score > 1.0 && score <= 10.0 {
                score / 10.0
            } else {
                score
            };
            score.clamp(0.0, 1.0)
        }
        _ => 0.0,
    }
}

fn clean_items(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(|item| truncate_chars(&item.replace('"', "'").replace(['\n', '\r'], " "), LIST_ITEM_MAX_CHARS))
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

pub fn batch_count(job_count: usize, batch_size: usize) -> usize {
    job_count.div_ceil(batch_size.max(1))
}

/// Splits postings into consecutive batches, preserving order.
pub fn partition(jobs: Vec<JobPosting>, batch_size: usize) -> Vec<Vec<JobPosting>> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::with_capacity(batch_count(jobs.len(), batch_size));
    let mut current = Vec::with_capacity(batch_size);

    for job in jobs {
        current.push(job);
        if current.len() == batch_size {
            batches.push(std::mem::replace(&mut current, Vec::with_capacity(batch_size)));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }

    batches
}

fn with_default_analysis(batch: Vec<JobPosting>) -> Vec<JobPosting> {
    batch
        .into_iter()
        .map(|job| job.with_analysis(JobAnalysis::default()))
        .collect()
}

/// Stable descending sort: ties keep their prior relative order.
pub fn rank_by_similarity(jobs: &mut [JobPosting]) {
    jobs.sort_by(|a, b| {
        b.analysis
            .similarity_score
            .partial_cmp(&a.analysis.similarity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

pub fn summarize(jobs: &[JobPosting]) -> AnalysisSummary {
    AnalysisSummary {
        analyzed_count: jobs.iter().filter(|j| j.analysis.analyzed).count(),
        total_count: jobs.len(),
        salary_extracted_count: jobs.iter().filter(|j| j.analysis.has_salary()).count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;
    use tempfile::TempDir;

    use crate::models::job::DEFAULT_EXPLANATION;

    /// Scores each job by the number embedded in its title; fails chosen batches.
    struct StubOracle {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        fail_titles: HashSet<String>,
    }

    impl StubOracle {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                fail_titles: HashSet::new(),
            }
        }

        fn failing_on(titles: &[&str]) -> Self {
            Self {
                fail_titles: titles.iter().map(|t| t.to_string()).collect(),
                ..Self::new()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn title_of(text: &str) -> &str {
        text.lines()
            .next()
            .and_then(|l| l.strip_prefix("Title: "))
            .unwrap_or_default()
    }

    #[async_trait]
    impl JobAnalysisOracle for StubOracle {
        async fn analyze_batch(
            &self,
            jobs: &[JobDigest],
            _candidate_summary: &str,
        ) -> Result<BatchAnalysis, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if jobs.iter().any(|j| self.fail_titles.contains(title_of(&j.text))) {
                return Err(AppError::Llm("stub failure".to_string()));
            }

            Ok(BatchAnalysis {
                job_analyses: jobs
                    .iter()
                    .map(|j| {
                        let n: f64 = title_of(&j.text)
                            .trim_start_matches("job")
                            .parse()
                            .unwrap_or(0.0);
                        JobAnalysisRecord {
                            job_index: Some(j.index),
                            similarity_score: Some((n % 10.0) / 10.0),
                            similarity_explanation: Some(format!("match for {}", title_of(&j.text))),
                            salary_min: Some(100_000.0),
                            salary_confidence: Some(0.8),
                            key_matches: vec!["Rust".to_string()],
                            ..JobAnalysisRecord::default()
                        }
                    })
                    .collect(),
            })
        }
    }

    struct Recorder(Mutex<Vec<AnalysisProgress>>);

    #[async_trait]
    impl BatchProgress for Recorder {
        async fn batch_completed(&self, progress: AnalysisProgress) {
            self.0.lock().push(progress);
        }
    }

    fn jobs(n: usize) -> Vec<JobPosting> {
        (0..n)
            .map(|i| JobPosting {
                title: Some(format!("job{i}")),
                company: Some("Acme".to_string()),
                description: Some(format!("Description {i}")),
                ..JobPosting::default()
            })
            .collect()
    }

    fn titles(jobs: &[JobPosting]) -> Vec<String> {
        jobs.iter().map(|j| j.title.clone().unwrap_or_default()).collect()
    }

    fn analyzer(oracle: Arc<StubOracle>, dir: &TempDir, settings: AnalysisSettings) -> BatchAnalyzer {
        let cache = Arc::new(ContentCache::new(dir.path(), Duration::from_secs(3600)));
        BatchAnalyzer::new(oracle, cache, settings)
    }

    fn plan(batch_size: usize, mode: AnalysisMode, budget: usize, rank: bool) -> AnalysisPlan {
        AnalysisPlan {
            batch_size,
            mode,
            budget,
            rank_by_similarity: rank,
        }
    }

    #[test]
    fn test_partition_preserves_order() {
        let batches = partition(jobs(7), 3);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![3, 3, 1]);
        assert_eq!(titles(&batches[2]), vec!["job6"]);
        assert!(partition(Vec::new(), 3).is_empty());
        assert_eq!(batch_count(7, 3), 3);
        assert_eq!(batch_count(0, 3), 0);
    }

    #[test]
    fn test_normalize_score() {
        assert_eq!(normalize_score(Some(0.42)), 0.42);
        assert_eq!(normalize_score(Some(1.0)), 1.0);
        assert_eq!(normalize_score(Some(8.0)), 0.8);
        assert_eq!(normalize_score(Some(55.0)), 1.0);
        assert_eq!(normalize_score(Some(-3.0)), 0.0);
        assert_eq!(normalize_score(Some(f64::NAN)), 0.0);
        assert_eq!(normalize_score(None), 0.0);
    }

    #[test]
    fn test_plan_cap_wins_and_parallel_needs_two_batches() {
        let dir = TempDir::new().unwrap();
        let settings = AnalysisSettings {
            max_jobs: 8,
            batch_size: 5,
            parallel: true,
            workers: 3,
            ..AnalysisSettings::default()
        };
        let a = analyzer(Arc::new(StubOracle::new()), &dir, settings);

        let p = a.plan_for(20);
        assert_eq!(p.budget, 8);
        assert_eq!(p.mode, AnalysisMode::Parallel { workers: 3 });

        let p = a.plan_for(4);
        assert_eq!(p.budget, 4);
        assert_eq!(p.mode, AnalysisMode::Sequential);
    }

    #[tokio::test]
    async fn test_sequential_preserves_count_and_order() {
        let dir = TempDir::new().unwrap();
        let oracle = Arc::new(StubOracle::new());
        let a = analyzer(oracle.clone(), &dir, AnalysisSettings::default());
        let recorder = Recorder(Mutex::new(Vec::new()));

        let outcome = a
            .analyze(jobs(7), &CandidateProfile::default(), plan(3, AnalysisMode::Sequential, 7, false), &recorder)
            .await;

        assert_eq!(outcome.jobs.len(), 7);
        assert_eq!(titles(&outcome.jobs), titles(&jobs(7)));
        assert_eq!(outcome.total_batches, 3);
        assert!(outcome.jobs.iter().all(|j| j.analysis.analyzed));
        assert_eq!(oracle.calls(), 3);

        let events = recorder.0.lock().clone();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].completed_batches, 3);
        assert_eq!(events[2].current_batch_size, Some(1));
    }

    #[tokio::test]
    async fn test_budget_appends_unanalyzed_tail() {
        let dir = TempDir::new().unwrap();
        let oracle = Arc::new(StubOracle::new());
        let a = analyzer(oracle.clone(), &dir, AnalysisSettings::default());

        let outcome = a
            .analyze(jobs(30), &CandidateProfile::default(), plan(5, AnalysisMode::Sequential, 20, false), &NoProgress)
            .await;

        assert_eq!(outcome.jobs.len(), 30);
        assert_eq!(outcome.summary.analyzed_count, 20);
        assert_eq!(outcome.summary.total_count, 30);
        assert!(outcome.jobs[..20].iter().all(|j| j.analysis.analyzed));
        for job in &outcome.jobs[20..] {
            assert!(!job.analysis.analyzed);
            assert_eq!(job.analysis.similarity_score, 0.0);
            assert!(job.analysis.similarity_explanation.contains("budget of 20"));
        }
        assert_eq!(oracle.calls(), 4);
    }

    #[tokio::test]
    async fn test_failed_batch_gets_defaults_and_others_proceed() {
        let dir = TempDir::new().unwrap();
        // 20 jobs, batches of 5; job12 lives in batch 3.
        let oracle = Arc::new(StubOracle::failing_on(&["job12"]));
        let a = analyzer(oracle.clone(), &dir, AnalysisSettings::default());

        let outcome = a
            .analyze(jobs(20), &CandidateProfile::default(), plan(5, AnalysisMode::Sequential, 20, false), &NoProgress)
            .await;

        assert_eq!(outcome.jobs.len(), 20);
        assert_eq!(oracle.calls(), 4);
        for (i, job) in outcome.jobs.iter().enumerate() {
            if (10..15).contains(&i) {
                assert!(!job.analysis.analyzed, "job {i}");
                assert_eq!(job.analysis.similarity_explanation, DEFAULT_EXPLANATION);
            } else {
                assert!(job.analysis.analyzed, "job {i}");
            }
        }
        assert_eq!(outcome.summary.analyzed_count, 15);
    }

    #[tokio::test]
    async fn test_parallel_failure_matches_sequential() {
        let dir = TempDir::new().unwrap();
        let oracle = Arc::new(StubOracle::failing_on(&["job12"]));
        let a = analyzer(oracle.clone(), &dir, AnalysisSettings::default());

        let outcome = a
            .analyze(
                jobs(20),
                &CandidateProfile::default(),
                plan(5, AnalysisMode::Parallel { workers: 2 }, 20, false),
                &NoProgress,
            )
            .await;

        assert_eq!(titles(&outcome.jobs), titles(&jobs(20)));
        assert_eq!(outcome.summary.analyzed_count, 15);
        assert!(!outcome.jobs[12].analysis.analyzed);
    }

    #[tokio::test]
    async fn test_parallel_respects_worker_limit() {
        let dir = TempDir::new().unwrap();
        let oracle = Arc::new(StubOracle::new());
        let a = analyzer(oracle.clone(), &dir, AnalysisSettings::default());
        let recorder = Recorder(Mutex::new(Vec::new()));

        let outcome = a
            .analyze(
                jobs(12),
                &CandidateProfile::default(),
                plan(2, AnalysisMode::Parallel { workers: 2 }, 12, false),
                &recorder,
            )
            .await;

        assert_eq!(outcome.jobs.len(), 12);
        assert_eq!(oracle.calls(), 6);
        assert!(oracle.max_in_flight.load(Ordering::SeqCst) <= 2);

        let completed: Vec<usize> = recorder.0.lock().iter().map(|p| p.completed_batches).collect();
        assert_eq!(completed, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_repeat_run_served_from_cache() {
        let dir = TempDir::new().unwrap();
        let oracle = Arc::new(StubOracle::new());
        let a = analyzer(oracle.clone(), &dir, AnalysisSettings::default());
        let profile = CandidateProfile {
            technical_skills: vec!["Rust".to_string()],
            ..CandidateProfile::default()
        };
        let p = plan(5, AnalysisMode::Sequential, 10, false);

        let first = a.analyze(jobs(10), &profile, p, &NoProgress).await;
        assert_eq!(oracle.calls(), 2);

        let second = a.analyze(jobs(10), &profile, p, &NoProgress).await;
        assert_eq!(oracle.calls(), 2);
        assert_eq!(titles(&first.jobs), titles(&second.jobs));
        let explanations = |jobs: &[JobPosting]| {
            jobs.iter()
                .map(|j| j.analysis.similarity_explanation.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(explanations(&first.jobs), explanations(&second.jobs));
        assert!(second.jobs.iter().all(|j| j.analysis.analyzed));

        let other_profile = CandidateProfile {
            technical_skills: vec!["Go".to_string()],
            ..CandidateProfile::default()
        };
        a.analyze(jobs(10), &other_profile, p, &NoProgress).await;
        assert_eq!(oracle.calls(), 4);
    }

    #[tokio::test]
    async fn test_ranking_is_descending_and_stable() {
        let dir = TempDir::new().unwrap();
        let oracle = Arc::new(StubOracle::new());
        let a = analyzer(oracle, &dir, AnalysisSettings::default());

        // Scores are (i % 10) / 10, so job3 and job13 tie.
        let outcome = a
            .analyze(jobs(14), &CandidateProfile::default(), plan(5, AnalysisMode::Sequential, 14, true), &NoProgress)
            .await;

        let scores: Vec<f64> = outcome.jobs.iter().map(|j| j.analysis.similarity_score).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));

        let order = titles(&outcome.jobs);
        let pos = |t: &str| order.iter().position(|x| x == t).unwrap();
        assert!(pos("job3") < pos("job13"));
        assert!(pos("job0") < pos("job10"));
    }

    #[tokio::test]
    async fn test_ranking_puts_unanalyzed_tail_last() {
        let dir = TempDir::new().unwrap();
        let a = analyzer(Arc::new(StubOracle::new()), &dir, AnalysisSettings::default());

        let outcome = a
            .analyze(jobs(12), &CandidateProfile::default(), plan(5, AnalysisMode::Sequential, 9, true), &NoProgress)
            .await;

        assert_eq!(outcome.jobs.len(), 12);
        assert_eq!(outcome.jobs[0].title.as_deref(), Some("job8"));
        let tail: Vec<String> = titles(&outcome.jobs[outcome.jobs.len() - 3..]);
        assert!(tail.contains(&"job10".to_string()));
        assert!(tail.contains(&"job11".to_string()));
    }

    #[tokio::test]
    async fn test_salary_fields_only_when_enabled() {
        let dir = TempDir::new().unwrap();
        let settings = AnalysisSettings {
            analyze_salary: false,
            ..AnalysisSettings::default()
        };
        let a = analyzer(Arc::new(StubOracle::new()), &dir, settings);

        let outcome = a
            .analyze(jobs(2), &CandidateProfile::default(), plan(5, AnalysisMode::Sequential, 2, false), &NoProgress)
            .await;

        assert!(outcome.jobs.iter().all(|j| !j.analysis.has_salary()));
        assert_eq!(outcome.summary.salary_extracted_count, 0);
        assert_eq!(outcome.jobs[1].analysis.similarity_explanation, "match for job1");
    }

    #[tokio::test]
    async fn test_empty_input() {
        let dir = TempDir::new().unwrap();
        let oracle = Arc::new(StubOracle::new());
        let a = analyzer(oracle.clone(), &dir, AnalysisSettings::default());

        let outcome = a
            .analyze(Vec::new(), &CandidateProfile::default(), a.plan_for(0), &NoProgress)
            .await;

        assert!(outcome.jobs.is_empty());
        assert_eq!(outcome.total_batches, 0);
        assert_eq!(oracle.calls(), 0);
    }

    #[test]
    fn test_missing_record_marks_analyzed_with_defaults() {
        let batch = jobs(2);
        let response = BatchAnalysis {
            job_analyses: vec![JobAnalysisRecord {
                job_index: Some(1),
                similarity_score: Some(0.9),
                similarity_explanation: Some("x".repeat(600)),
                key_matches: vec!["  ".to_string(), "say \"hi\"\nnow".to_string()],
                ..JobAnalysisRecord::default()
            }],
        };

        let applied = apply_analysis(&batch, &response, true);
        assert!(applied[0].analysis.analyzed);
        assert_eq!(applied[0].analysis.similarity_score, 0.0);
        assert_eq!(applied[1].analysis.similarity_score, 0.9);
        assert_eq!(applied[1].analysis.similarity_explanation.chars().count(), 503);
        assert_eq!(applied[1].analysis.key_matches, vec!["say 'hi' now".to_string()]);
    }

    #[test]
    fn test_job_text_truncates_description() {
        let job = JobPosting {
            title: Some("Engineer".to_string()),
            description: Some("d".repeat(1500)),
            ..JobPosting::default()
        };
        let text = job_text(&job);
        assert!(text.starts_with("Title: Engineer\nCompany: N/A\nLocation: N/A\nDescription: "));
        assert!(text.ends_with("..."));
        assert!(text.len() < 1100);
    }
}
