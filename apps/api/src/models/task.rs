use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::job::JobListing;

/// Phase of an asynchronous search task. `Complete` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    Initializing,
    Scraping,
    Analyzing,
    Complete,
    Error,
}

impl TaskPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskPhase::Complete | TaskPhase::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisProgress {
    pub completed_batches: usize,
    pub total_batches: usize,
    pub current_batch_size: Option<usize>,
}

/// Point-in-time state of one task as seen by pollers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub phase: TaskPhase,
    pub percent: u8,
    pub details: Option<String>,
    pub analysis_progress: Option<AnalysisProgress>,
    /// Present only once `phase == Complete`.
    pub result: Option<SearchResults>,
    pub updated_at: DateTime<Utc>,
}

impl TaskSnapshot {
    pub fn new(phase: TaskPhase, percent: u8, details: impl Into<String>) -> Self {
        Self {
            phase,
            percent: percent.min(100),
            details: Some(details.into()),
            analysis_progress: None,
            result: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_analysis_progress(mut self, progress: AnalysisProgress) -> Self {
        self.analysis_progress = Some(progress);
        self
    }

    pub fn completed(results: SearchResults) -> Self {
        Self {
            result: Some(results),
            ..Self::new(TaskPhase::Complete, 100, "Job search completed!")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    pub search_term: String,
    pub location: String,
    pub results_wanted: usize,
    pub initial_scraped_count: usize,
    pub final_returned_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub analyzed_count: usize,
    pub total_count: usize,
    pub salary_extracted_count: usize,
}

/// Final payload of a pipeline run, returned inline (sync path) or stored in
/// the `complete` snapshot (async path).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub jobs: Vec<JobListing>,
    pub count: usize,
    pub search_params: SearchParams,
    pub output_file: String,
    pub analysis_enabled: bool,
    pub jobs_analyzed: bool,
    pub analysis_summary: Option<AnalysisSummary>,
    /// Set when the job-search provider failed and the run continued empty.
    pub search_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&TaskPhase::Initializing).unwrap(),
            "\"initializing\""
        );
        let phase: TaskPhase = serde_json::from_str("\"analyzing\"").unwrap();
        assert_eq!(phase, TaskPhase::Analyzing);
    }

    #[test]
    fn test_terminal_phases() {
        assert!(TaskPhase::Complete.is_terminal());
        assert!(TaskPhase::Error.is_terminal());
        assert!(!TaskPhase::Scraping.is_terminal());
    }

    #[test]
    fn test_percent_is_capped() {
        assert_eq!(TaskSnapshot::new(TaskPhase::Analyzing, 140, "x").percent, 100);
    }
}
