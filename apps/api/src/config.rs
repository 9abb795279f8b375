use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    pub job_search_url: String,
    pub cache_dir: PathBuf,
    pub cache_ttl: Duration,
    pub search: SearchSettings,
    pub analysis: AnalysisSettings,
    pub progress: ProgressSettings,
    pub port: u16,
    pub rust_log: String,
}

/// Job-board query defaults and pipeline limits.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub sites: Vec<String>,
    pub hours_old: u32,
    pub default_location: String,
    pub default_country: String,
    pub default_results: usize,
    /// Requests at or below this many results run inline when analysis is off.
    pub sync_threshold: usize,
    pub max_results: usize,
    pub description_max_length: usize,
    pub results_dir: PathBuf,
    pub max_concurrent_pipelines: usize,
}

/// Batch analysis knobs.
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub enabled: bool,
    pub batch_size: usize,
    pub parallel: bool,
    pub workers: usize,
    pub max_jobs: usize,
    pub rank_by_similarity: bool,
    pub analyze_salary: bool,
    pub request_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct ProgressSettings {
    pub redis_url: Option<String>,
    /// Expiry applied on every write.
    pub ttl: Duration,
    /// How long a finished task stays visible to pollers.
    pub retention: Duration,
    pub reaper_interval: Duration,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            sites: vec!["indeed".to_string(), "linkedin".to_string()],
            hours_old: 72,
            default_location: "Remote".to_string(),
            default_country: "USA".to_string(),
            default_results: 10,
            sync_threshold: 10,
            max_results: 200,
            description_max_length: 500,
            results_dir: PathBuf::from("job_results"),
            max_concurrent_pipelines: 4,
        }
    }
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            batch_size: 5,
            parallel: true,
            workers: 5,
            max_jobs: 20,
            rank_by_similarity: true,
            analyze_salary: true,
            request_delay: Duration::ZERO,
        }
    }
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            redis_url: None,
            ttl: Duration::from_secs(3600),
            retention: Duration::from_secs(300),
            reaper_interval: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let search_defaults = SearchSettings::default();
        let analysis_defaults = AnalysisSettings::default();
        let progress_defaults = ProgressSettings::default();

        let search = SearchSettings {
            sites: std::env::var("JOB_SEARCH_SITES")
                .map(|raw| parse_list(&raw))
                .unwrap_or(search_defaults.sites),
            hours_old: env_or("JOB_SEARCH_HOURS_OLD", search_defaults.hours_old)?,
            default_location: std::env::var("JOB_SEARCH_DEFAULT_LOCATION")
                .unwrap_or(search_defaults.default_location),
            default_country: std::env::var("JOB_SEARCH_DEFAULT_COUNTRY")
                .unwrap_or(search_defaults.default_country),
            default_results: env_or("JOB_SEARCH_DEFAULT_RESULTS", search_defaults.default_results)?,
            sync_threshold: env_or("JOB_SEARCH_SYNC_THRESHOLD", search_defaults.sync_threshold)?,
            max_results: env_or("JOB_SEARCH_MAX_RESULTS", search_defaults.max_results)?,
            description_max_length: env_or(
                "DESCRIPTION_MAX_LENGTH",
                search_defaults.description_max_length,
            )?,
            results_dir: std::env::var("JOB_RESULTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(search_defaults.results_dir),
            max_concurrent_pipelines: env_or(
                "MAX_CONCURRENT_PIPELINES",
                search_defaults.max_concurrent_pipelines,
            )?
            .max(1),
        };

        let analysis = AnalysisSettings {
            enabled: env_or("JOB_ANALYSIS_ENABLED", analysis_defaults.enabled)?,
            batch_size: env_or("JOB_ANALYSIS_BATCH_SIZE", analysis_defaults.batch_size)?.max(1),
            parallel: env_or("JOB_ANALYSIS_PARALLEL", analysis_defaults.parallel)?,
            workers: env_or("JOB_ANALYSIS_WORKERS", analysis_defaults.workers)?.max(1),
            max_jobs: env_or("JOB_ANALYSIS_MAX_JOBS", analysis_defaults.max_jobs)?,
            rank_by_similarity: env_or(
                "JOB_ANALYSIS_RANK_BY_SIMILARITY",
                analysis_defaults.rank_by_similarity,
            )?,
            analyze_salary: env_or("JOB_ANALYSIS_SALARY", analysis_defaults.analyze_salary)?,
            request_delay: Duration::from_millis(env_or("JOB_ANALYSIS_REQUEST_DELAY_MS", 0u64)?),
        };

        let progress = ProgressSettings {
            redis_url: std::env::var("REDIS_URL").ok().filter(|s| !s.trim().is_empty()),
            ttl: Duration::from_secs(env_or(
                "PROGRESS_TTL_SECS",
                progress_defaults.ttl.as_secs(),
            )?),
            retention: Duration::from_secs(env_or(
                "PROGRESS_RETENTION_SECS",
                progress_defaults.retention.as_secs(),
            )?),
            reaper_interval: Duration::from_secs(
                env_or(
                    "PROGRESS_REAPER_INTERVAL_SECS",
                    progress_defaults.reaper_interval.as_secs(),
                )?
                .max(1),
            ),
        };

        Ok(Config {
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            job_search_url: require_env("JOB_SEARCH_URL")?,
            cache_dir: std::env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".cache")),
            cache_ttl: Duration::from_secs(env_or("CACHE_TTL_HOURS", 168u64)? * 3600),
            search,
            analysis,
            progress,
            port: env_or("PORT", 8080u16)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_trims_and_lowercases() {
        assert_eq!(
            parse_list(" Indeed, LinkedIn ,,glassdoor"),
            vec!["indeed", "linkedin", "glassdoor"]
        );
    }

    #[test]
    fn test_env_or_falls_back_when_unset() {
        let value: usize = env_or("SEEKR_TEST_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_env_or_rejects_garbage() {
        std::env::set_var("SEEKR_TEST_BAD_NUMBER", "five");
        let result: Result<usize> = env_or("SEEKR_TEST_BAD_NUMBER", 5);
        assert!(result.is_err());
        std::env::remove_var("SEEKR_TEST_BAD_NUMBER");
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let analysis = AnalysisSettings::default();
        assert_eq!(analysis.batch_size, 5);
        assert_eq!(analysis.workers, 5);
        assert_eq!(analysis.max_jobs, 20);
        assert!(!analysis.enabled);

        let progress = ProgressSettings::default();
        assert_eq!(progress.ttl, Duration::from_secs(3600));
        assert_eq!(progress.retention, Duration::from_secs(300));
    }
}
