//! Job analysis oracle: the external service that scores one batch of postings.
//!
//! `BatchAnalyzer` only sees the `JobAnalysisOracle` trait, so tests drive it
//! with in-process stubs and production uses `LlmJobOracle`.

use std::fmt::Write as _;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::prompts::{
    JOB_ANALYSIS_PROMPT_TEMPLATE, JOB_ANALYSIS_SYSTEM, SALARY_FIELDS, SALARY_INSTRUCTIONS,
};
use crate::errors::AppError;
use crate::llm_client::prompts::JSON_ONLY_INSTRUCTION;
use crate::llm_client::LlmClient;

// ────────────────────────────────────────────────────────────────────────────
// Wire models
// ────────────────────────────────────────────────────────────────────────────

/// One posting as the oracle sees it. `index` is the position inside the batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobDigest {
    pub index: usize,
    pub text: String,
}

/// Oracle answer for a whole batch. Also the cached payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchAnalysis {
    #[serde(default)]
    pub job_analyses: Vec<JobAnalysisRecord>,
}

/// Per-job record. Everything is optional; the analyzer normalizes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobAnalysisRecord {
    pub job_index: Option<usize>,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub salary_confidence: Option<f64>,
    pub similarity_score: Option<f64>,
    pub similarity_explanation: Option<String>,
    pub key_matches: Vec<String>,
    pub missing_requirements: Vec<String>,
}

impl BatchAnalysis {
    pub fn record_for(&self, index: usize) -> Option<&JobAnalysisRecord> {
        self.job_analyses
            .iter()
            .find(|record| record.job_index == Some(index))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

/// Scores a batch of postings against a candidate summary.
///
/// Any `Err` is treated as a failure of that batch only.
#[async_trait]
pub trait JobAnalysisOracle: Send + Sync {
    async fn analyze_batch(
        &self,
        jobs: &[JobDigest],
        candidate_summary: &str,
    ) -> Result<BatchAnalysis, AppError>;
}

// ────────────────────────────────────────────────────────────────────────────
// LLM backend
// ────────────────────────────────────────────────────────────────────────────

pub struct LlmJobOracle {
    llm: LlmClient,
    analyze_salary: bool,
}

impl LlmJobOracle {
    pub fn new(llm: LlmClient, analyze_salary: bool) -> Self {
        Self {
            llm,
            analyze_salary,
        }
    }
}

#[async_trait]
impl JobAnalysisOracle for LlmJobOracle {
    async fn analyze_batch(
        &self,
        jobs: &[JobDigest],
        candidate_summary: &str,
    ) -> Result<BatchAnalysis, AppError> {
        let prompt = build_prompt(jobs, candidate_summary, self.analyze_salary);
        debug!("Analyzing batch of {} jobs via LLM", jobs.len());

        self.llm
            .call_json::<BatchAnalysis>(&prompt, JOB_ANALYSIS_SYSTEM)
            .await
            .map_err(|e| AppError::Llm(format!("Batch job analysis failed: {e}")))
    }
}

pub(crate) fn build_prompt(jobs: &[JobDigest], candidate_summary: &str, analyze_salary: bool) -> String {
    let mut postings = String::new();
    for job in jobs {
        let _ = write!(postings, "\n--- Job {} ---\n{}\n", job.index, job.text);
    }

    let (salary_fields, salary_instructions) = if analyze_salary {
        (SALARY_FIELDS, SALARY_INSTRUCTIONS)
    } else {
        ("", "")
    };

    let prompt = JOB_ANALYSIS_PROMPT_TEMPLATE
        .replace("{candidate_profile}", candidate_summary)
        .replace("{job_postings}", &postings)
        .replace("{salary_fields}", salary_fields)
        .replace("{salary_instructions}", salary_instructions);

    format!("{prompt}\n\n{JSON_ONLY_INSTRUCTION}")
}
