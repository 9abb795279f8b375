//! Job-search provider: the external scraping service that returns raw postings.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::AppError;
use crate::models::job::{JobAnalysis, JobPosting};

/// Query sent to the provider. Field names follow the scraping service's API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSearchQuery {
    pub site_name: Vec<String>,
    pub search_term: String,
    pub google_search_term: String,
    pub location: String,
    pub results_wanted: usize,
    pub hours_old: u32,
    pub country_indeed: String,
}

/// The provider may return fewer postings than requested, or more.
#[async_trait]
pub trait JobSearchProvider: Send + Sync {
    async fn search(&self, query: &JobSearchQuery) -> Result<Vec<JobPosting>, AppError>;
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    Wrapped { jobs: Vec<JobPosting> },
    Bare(Vec<JobPosting>),
}

impl SearchResponse {
    /// Raw postings; analysis-looking keys sent by the provider are discarded.
    fn into_jobs(self) -> Vec<JobPosting> {
        let (SearchResponse::Wrapped { jobs } | SearchResponse::Bare(jobs)) = self;
        jobs.into_iter()
            .map(|job| job.with_analysis(JobAnalysis::default()))
            .collect()
    }
}

/// Provider backed by an HTTP scraping service (`POST {url}` with a JSON query).
#[derive(Clone)]
pub struct HttpJobSearchProvider {
    client: Client,
    url: String,
}

impl HttpJobSearchProvider {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(300))
                .build()
                .expect("Failed to build HTTP client"),
            url: url.into(),
        }
    }
}

#[async_trait]
impl JobSearchProvider for HttpJobSearchProvider {
    async fn search(&self, query: &JobSearchQuery) -> Result<Vec<JobPosting>, AppError> {
        debug!("Job search query: {query:?}");

        let response = self
            .client
            .post(&self.url)
            .json(query)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!("status {status}: {body}")));
        }

        let jobs = response
            .json::<SearchResponse>()
            .await
            .map_err(|e| AppError::Provider(format!("invalid response body: {e}")))?
            .into_jobs();

        info!(
            "Provider returned {} jobs for '{}' in '{}'",
            jobs.len(),
            query.search_term,
            query.location
        );
        Ok(jobs)
    }
}
