// LLM prompt constants for candidate profile extraction.

pub const KEYWORD_EXTRACTION_SYSTEM: &str =
    "You are an expert resume analyzer and job search specialist.";

/// Replace `{resume_text}` before sending.
pub const KEYWORD_EXTRACTION_PROMPT_TEMPLATE: &str = r#"Analyze the following resume and extract the information needed to search for matching jobs.

RESUME:
{resume_text}

Return this EXACT JSON schema:
{
  "technical_skills": ["skill1", "skill2"],
  "job_titles": ["title1", "title2"],
  "years_of_experience": "number or range",
  "industries": ["industry1"],
  "specializations": ["area1"],
  "location": "city, state or Not specified"
}

Rules:
- technical_skills: programming languages, frameworks, tools and platforms actually used.
- job_titles: titles held plus titles the candidate is clearly qualified for, most relevant first.
- years_of_experience: total professional experience as stated or inferred from dates.
- location: only if stated on the resume; otherwise "Not specified"."#;

pub const SEARCH_TERMS_SYSTEM: &str = "You are an expert job search strategist and recruiter.";

/// Replace `{profile}`, `{location_line}` and `{position_line}` before sending.
pub const SEARCH_TERMS_PROMPT_TEMPLATE: &str = r#"Based on this candidate profile, generate optimal job search terms for job boards.

CANDIDATE PROFILE:
{profile}
{location_line}{position_line}
Return this EXACT JSON schema:
{
  "primary_search_terms": ["term1", "term2", "term3"],
  "secondary_search_terms": ["term1", "term2"],
  "skills_based_terms": ["term1", "term2"],
  "location": "preferred search location",
  "experience_level": "entry | mid | senior | lead",
  "google_search_string": "query suitable for a Google Jobs search"
}

Rules:
- primary_search_terms: 3-5 job titles most likely to return relevant postings, best first.
- Keep each term short (2-4 words); job boards match on titles.
- If a desired position is given, the first primary term must target it."#;
