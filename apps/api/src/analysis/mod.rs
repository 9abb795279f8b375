// Job analysis: scores scraped postings against a candidate profile.
// All LLM calls go through llm_client via the JobAnalysisOracle trait.

pub mod batch;
pub mod oracle;
pub mod prompts;
