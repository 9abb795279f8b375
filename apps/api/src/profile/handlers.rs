//! Axum route handlers for the Profile API.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::profile::{CandidateProfile, SearchTerms};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ExtractProfileRequest {
    /// Plain resume text with personal details already redacted.
    pub resume_text: String,
    pub target_location: Option<String>,
    pub desired_position: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExtractProfileResponse {
    pub keywords: CandidateProfile,
    pub search_terms: SearchTerms,
}

/// POST /api/v1/profile/extract
///
/// Both steps are cached, so repeated uploads of the same resume are free.
pub async fn handle_extract(
    State(state): State<AppState>,
    Json(request): Json<ExtractProfileRequest>,
) -> Result<Json<ExtractProfileResponse>, AppError> {
    let keywords = state.profiles.extract_keywords(&request.resume_text).await?;
    let search_terms = state
        .profiles
        .generate_search_terms(
            &keywords,
            request.target_location.as_deref(),
            request.desired_position.as_deref(),
        )
        .await?;

    Ok(Json(ExtractProfileResponse {
        keywords,
        search_terms,
    }))
}
