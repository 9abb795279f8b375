//! Candidate profile extraction: resume text → keywords → job-board search terms.
//!
//! Both calls are cached in the shared ContentCache, so re-submitting the same
//! resume (or the same profile with the same location/position) costs nothing.

pub mod handlers;
pub mod prompts;

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use crate::cache::ContentCache;
use crate::errors::AppError;
use crate::llm_client::prompts::{JSON_ONLY_INSTRUCTION, REDACTION_NOTE};
use crate::llm_client::LlmClient;
use crate::models::profile::{CandidateProfile, SearchTerms};
use prompts::{
    KEYWORD_EXTRACTION_PROMPT_TEMPLATE, KEYWORD_EXTRACTION_SYSTEM, SEARCH_TERMS_PROMPT_TEMPLATE,
    SEARCH_TERMS_SYSTEM,
};

pub const EXTRACT_KEYWORDS_OPERATION: &str = "extract_keywords";
pub const SEARCH_TERMS_OPERATION: &str = "generate_search_terms";

#[derive(Clone)]
pub struct ProfileExtractor {
    llm: LlmClient,
    cache: Arc<ContentCache>,
}

impl ProfileExtractor {
    pub fn new(llm: LlmClient, cache: Arc<ContentCache>) -> Self {
        Self { llm, cache }
    }

    pub async fn extract_keywords(&self, resume_text: &str) -> Result<CandidateProfile, AppError> {
        let resume_text = resume_text.trim();
        if resume_text.is_empty() {
            return Err(AppError::Validation("resume_text must not be empty".into()));
        }

        let key = ContentCache::key(EXTRACT_KEYWORDS_OPERATION, resume_text, &[]);
        let prompt = format!(
            "{}\n\n{REDACTION_NOTE}\n\n{JSON_ONLY_INSTRUCTION}",
            KEYWORD_EXTRACTION_PROMPT_TEMPLATE.replace("{resume_text}", resume_text)
        );

        let profile: CandidateProfile = self
            .cached_call(&key, &prompt, KEYWORD_EXTRACTION_SYSTEM)
            .await?;
        info!(
            "Extracted profile: {} skills, {} titles",
            profile.technical_skills.len(),
            profile.job_titles.len()
        );
        Ok(profile)
    }

    pub async fn generate_search_terms(
        &self,
        profile: &CandidateProfile,
        target_location: Option<&str>,
        desired_position: Option<&str>,
    ) -> Result<SearchTerms, AppError> {
        let target_location = target_location.map(str::trim).unwrap_or_default();
        let desired_position = desired_position.map(str::trim).unwrap_or_default();

        let profile_json = serde_json::to_string_pretty(profile)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Serializing profile failed: {e}")))?;
        let key = ContentCache::key(
            SEARCH_TERMS_OPERATION,
            &profile_json,
            &[("location", target_location), ("position", desired_position)],
        );

        let location_line = if target_location.is_empty() {
            String::new()
        } else {
            format!("TARGET LOCATION: {target_location}\n")
        };
        let position_line = if desired_position.is_empty() {
            String::new()
        } else {
            format!("DESIRED POSITION: {desired_position}\n")
        };
        let prompt = format!(
            "{}\n\n{JSON_ONLY_INSTRUCTION}",
            SEARCH_TERMS_PROMPT_TEMPLATE
                .replace("{profile}", &profile_json)
                .replace("{location_line}", &location_line)
                .replace("{position_line}", &position_line)
        );

        self.cached_call(&key, &prompt, SEARCH_TERMS_SYSTEM).await
    }

    async fn cached_call<T>(&self, key: &str, prompt: &str, system: &str) -> Result<T, AppError>
    where
        T: DeserializeOwned + Serialize + Send + 'static,
    {
        if let Some(hit) = self.cache.fetch::<T>(key).await {
            debug!("Profile cache hit for {}", &key[..12.min(key.len())]);
            return Ok(hit);
        }

        let fresh: T = self
            .llm
            .call_json(prompt, system)
            .await
            .map_err(|e| AppError::Llm(format!("Profile extraction failed: {e}")))?;
        self.cache.store(key, &fresh).await;
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn extractor(dir: &TempDir) -> ProfileExtractor {
        let cache = Arc::new(ContentCache::new(dir.path(), Duration::from_secs(3600)));
        ProfileExtractor::new(LlmClient::new("test-key".to_string()), cache)
    }

    #[tokio::test]
    async fn test_extract_keywords_served_from_cache() {
        let dir = TempDir::new().unwrap();
        let extractor = extractor(&dir);
        let cached = CandidateProfile {
            technical_skills: vec!["Rust".to_string()],
            ..CandidateProfile::default()
        };
        extractor.cache.store(
            &ContentCache::key(EXTRACT_KEYWORDS_OPERATION, "Senior engineer, Rust", &[]),
            &cached,
        )
        .await;

        // Surrounding whitespace does not change the key.
        let profile = extractor
            .extract_keywords("  Senior engineer, Rust\n")
            .await
            .unwrap();
        assert_eq!(profile, cached);
    }

    #[tokio::test]
    async fn test_empty_resume_rejected() {
        let dir = TempDir::new().unwrap();
        let err = extractor(&dir).extract_keywords("   ").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_search_terms_keyed_by_location_and_position() {
        let dir = TempDir::new().unwrap();
        let extractor = extractor(&dir);
        let profile = CandidateProfile {
            job_titles: vec!["Backend Engineer".to_string()],
            ..CandidateProfile::default()
        };
        let profile_json = serde_json::to_string_pretty(&profile).unwrap();
        let terms = SearchTerms {
            primary_search_terms: vec!["platform engineer".to_string()],
            ..SearchTerms::default()
        };
        extractor.cache.store(
            &ContentCache::key(
                SEARCH_TERMS_OPERATION,
                &profile_json,
                &[("location", "Berlin"), ("position", "")],
            ),
            &terms,
        )
        .await;

        let got = extractor
            .generate_search_terms(&profile, Some("Berlin"), None)
            .await
            .unwrap();
        assert_eq!(got, terms);

        let other = ContentCache::key(
            SEARCH_TERMS_OPERATION,
            &profile_json,
            &[("location", "Berlin"), ("position", "SRE")],
        );
        assert!(extractor.cache.get(&other).is_none());
    }
}
