use serde::{Deserialize, Serialize};

/// Explanation carried by postings whose analysis was skipped or failed.
pub const DEFAULT_EXPLANATION: &str = "Analysis not available";

/// A scraped job posting. Every base field is optional because upstream data
/// is unreliable; analysis fields are always present (see `JobAnalysis`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub site: Option<String>,
    pub job_url: Option<String>,
    pub description: Option<String>,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub date_posted: Option<String>,
    #[serde(flatten)]
    pub analysis: JobAnalysis,
}

/// Analysis-augmented fields. When `analyzed == false` the values are the
/// defaults from `JobAnalysis::default()`, never absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobAnalysis {
    pub analyzed: bool,
    /// 0.0 – 1.0
    pub similarity_score: f64,
    pub similarity_explanation: String,
    pub salary_min_extracted: Option<f64>,
    pub salary_max_extracted: Option<f64>,
    /// 0.0 – 1.0
    pub salary_confidence: f64,
    pub key_matches: Vec<String>,
    pub missing_requirements: Vec<String>,
}

impl Default for JobAnalysis {
    fn default() -> Self {
        Self {
            analyzed: false,
            similarity_score: 0.0,
            similarity_explanation: DEFAULT_EXPLANATION.to_string(),
            salary_min_extracted: None,
            salary_max_extracted: None,
            salary_confidence: 0.0,
            key_matches: Vec::new(),
            missing_requirements: Vec::new(),
        }
    }
}

impl JobAnalysis {
    /// Default analysis with a specific reason in place of the generic explanation.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            similarity_explanation: reason.into(),
            ..Self::default()
        }
    }

    pub fn has_salary(&self) -> bool {
        self.salary_min_extracted.is_some() || self.salary_max_extracted.is_some()
    }
}

impl JobPosting {
    pub fn with_analysis(mut self, analysis: JobAnalysis) -> Self {
        self.analysis = analysis;
        self
    }
}

/// Caller-facing representation of a posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobListing {
    pub title: String,
    pub company: String,
    pub location: String,
    pub site: String,
    pub job_url: String,
    pub description: String,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub date_posted: String,
    #[serde(flatten)]
    pub analysis: JobAnalysis,
}

impl JobListing {
    pub fn from_posting(posting: &JobPosting, description_max_length: usize) -> Self {
        let or_na = |field: &Option<String>| {
            field
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or("N/A")
                .to_string()
        };

        Self {
            title: or_na(&posting.title),
            company: or_na(&posting.company),
            location: or_na(&posting.location),
            site: or_na(&posting.site),
            job_url: posting.job_url.clone().unwrap_or_default(),
            description: truncate_chars(
                posting.description.as_deref().unwrap_or_default(),
                description_max_length,
            ),
            salary_min: posting.salary_min,
            salary_max: posting.salary_max,
            date_posted: posting.date_posted.clone().unwrap_or_default(),
            analysis: posting.analysis.clone(),
        }
    }
}

/// Truncates on a char boundary, appending `...` when anything was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
