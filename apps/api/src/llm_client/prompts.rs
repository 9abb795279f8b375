// Shared prompt fragments. Each service that needs LLM calls defines its own
// prompts.rs alongside it and reuses what is here.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_INSTRUCTION: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Reminder that the resume text has already been redacted.
pub const REDACTION_NOTE: &str =
    "Some personally identifying information has been redacted for privacy; \
    do not try to reconstruct it.";
