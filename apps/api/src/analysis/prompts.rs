// LLM prompt constants for job analysis.
// Reuses cross-cutting fragments from llm_client::prompts.

/// System prompt for batch job analysis.
pub const JOB_ANALYSIS_SYSTEM: &str = "You are an expert HR analyst and career counselor. \
    Analyze job postings for salary information and similarity to candidate profiles. \
    Be accurate and conservative in your assessments.";

/// Batch analysis prompt. Replace `{candidate_profile}`, `{job_postings}`,
/// `{salary_fields}` and `{salary_instructions}` before sending.
pub const JOB_ANALYSIS_PROMPT_TEMPLATE: &str = r#"Analyze the following job postings in relation to this candidate profile.

CANDIDATE PROFILE:
{candidate_profile}

JOB POSTINGS:
{job_postings}

For each job, return one entry in this EXACT JSON schema:
{
  "job_analyses": [
    {
      "job_index": 0,{salary_fields}
      "similarity_score": 0.0,
      "similarity_explanation": "",
      "key_matches": ["match1", "match2"],
      "missing_requirements": ["req1", "req2"]
    }
  ]
}

Instructions:
- job_index is the number shown in the "--- Job N ---" header.
- Rate similarity from 0.0 to 1.0 based on skill match, experience level, and role alignment.
- Consider both technical skills and domain experience in similarity scoring.
- Identify key skill/experience matches between candidate and job requirements.
- Note any significant missing requirements.{salary_instructions}"#;

pub const SALARY_FIELDS: &str = r#"
      "salary_min": null,
      "salary_max": null,
      "salary_confidence": 0.0,"#;

pub const SALARY_INSTRUCTIONS: &str = "
- Extract salary information only if clearly stated (annual salary in USD). \
Set salary_confidence between 0 and 1 based on how explicit the salary info is.";
