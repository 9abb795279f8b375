use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Keywords extracted from a (redacted) resume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateProfile {
    pub technical_skills: Vec<String>,
    pub job_titles: Vec<String>,
    #[serde(deserialize_with = "loose_string")]
    pub years_of_experience: Option<String>,
    pub industries: Vec<String>,
    pub specializations: Vec<String>,
    #[serde(deserialize_with = "loose_string")]
    pub location: Option<String>,
}

/// Job-board query terms derived from a profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchTerms {
    pub primary_search_terms: Vec<String>,
    pub secondary_search_terms: Vec<String>,
    pub skills_based_terms: Vec<String>,
    #[serde(deserialize_with = "loose_string")]
    pub location: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub experience_level: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub google_search_string: Option<String>,
}

impl CandidateProfile {
    /// Compact one-line summary used as the candidate side of job analysis.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();

        if !self.technical_skills.is_empty() {
            parts.push(format!(
                "Technical Skills: {}",
                head(&self.technical_skills, 10).join(", ")
            ));
        }
        if !self.job_titles.is_empty() {
            parts.push(format!("Experience: {}", head(&self.job_titles, 5).join(", ")));
        }
        if !self.industries.is_empty() {
            parts.push(format!("Industries: {}", head(&self.industries, 3).join(", ")));
        }
        if let Some(years) = self.years_of_experience.as_deref().filter(|y| !y.is_empty()) {
            parts.push(format!("Years of Experience: {years}"));
        }

        parts.join(" | ")
    }

    /// Location stated on the resume, if any.
    pub fn inferred_location(&self) -> Option<&str> {
        self.location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.eq_ignore_ascii_case("not specified"))
    }
}

fn head(items: &[String], n: usize) -> &[String] {
    &items[..items.len().min(n)]
}

/// Models return `"5 years"`, `5` or `null` interchangeably.
fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}
