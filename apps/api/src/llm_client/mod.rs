/// LLM Client — the single point of entry for all Claude API calls in Seekr.
///
/// ARCHITECTURAL RULE: No other module may call the Anthropic API directly.
/// Profile extraction and job analysis both go through this module.
///
/// Model: claude-sonnet-4-5 (hardcoded — do not make configurable to prevent drift)
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The model used for all LLM calls in Seekr.
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 4096;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Structured output error: {0}")]
    Parse(#[from] StructuredParseError),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,
}

/// Failure to recover a JSON document from free-form model output.
#[derive(Debug, Error)]
pub enum StructuredParseError {
    #[error("no JSON document found in response")]
    NoJson,

    #[error("invalid JSON: {0}")]
    Invalid(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Extracts the text content from the first text block.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

/// The single LLM client used by all services in Seekr.
/// Wraps the Anthropic Messages API with retry logic and structured output helpers.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
}

impl LlmClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    /// Makes a raw call to the Claude API, returning the full response object.
    /// Retries on 429 (rate limit) and 5xx errors with exponential backoff.
    pub async fn call(&self, prompt: &str, system: &str) -> Result<LlmResponse, LlmError> {
        let request_body = AnthropicRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<AnthropicError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let llm_response: LlmResponse = response.json().await?;

            debug!(
                "LLM call succeeded: input_tokens={}, output_tokens={}",
                llm_response.usage.input_tokens, llm_response.usage.output_tokens
            );

            return Ok(llm_response);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }

    /// Calls the LLM and recovers a typed JSON document from the text response.
    /// The prompt must instruct the model to return valid JSON.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<T, LlmError> {
        let response = self.call(prompt, system).await?;

        let text = response.text().ok_or(LlmError::EmptyContent)?;

        parse_structured_response(text).map_err(|e| {
            warn!(
                "Could not parse structured LLM output: {e}; head={:?}",
                text.chars().take(200).collect::<String>()
            );
            LlmError::Parse(e)
        })
    }
}

/// Recovers a JSON document from model output.
///
/// Fallback chain: the whole text, a ```json fenced block, any fenced block,
/// then the outermost `{ ... }` span. The first candidate that deserializes wins.
pub fn parse_structured_response<T: DeserializeOwned>(
    text: &str,
) -> Result<T, StructuredParseError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(StructuredParseError::NoJson);
    }

    let candidates = [
        Some(text),
        fenced_block(text, "```json"),
        fenced_block(text, "```"),
        brace_span(text),
    ];

    let mut last_error = None;
    for candidate in candidates.into_iter().flatten() {
        match serde_json::from_str::<T>(candidate) {
            Ok(value) => return Ok(value),
            Err(e) => last_error = Some(e),
        }
    }

    Err(last_error
        .map(StructuredParseError::Invalid)
        .unwrap_or(StructuredParseError::NoJson))
}

/// Body of the first fenced block opened by `opener`. A bare language tag on
/// the opening line (```` ```JSON ````, ```` ```javascript ````) is skipped.
fn fenced_block<'a>(text: &'a str, opener: &str) -> Option<&'a str> {
    let start = text.find(opener)? + opener.len();
    let mut rest = &text[start..];

    if let Some(newline) = rest.find('\n') {
        let tag = rest[..newline].trim();
        if !tag.is_empty() && tag.chars().all(|c| c.is_ascii_alphanumeric()) {
            rest = &rest[newline + 1..];
        }
    }

    let end = rest.find("```")?;
    let body = rest[..end].trim();
    (!body.is_empty()).then_some(body)
}

fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        key: String,
    }

    #[test]
    fn test_direct_json_parses() {
        let parsed: Sample = parse_structured_response("{\"key\": \"value\"}").unwrap();
        assert_eq!(parsed.key, "value");
    }

    #[test]
    fn test_json_fence_with_tag() {
        let input = "Here you go:\n```json\n{\"key\": \"value\"}\n```\nThanks";
        let parsed: Sample = parse_structured_response(input).unwrap();
        assert_eq!(parsed.key, "value");
    }

    #[test]
    fn test_fence_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        let parsed: Sample = parse_structured_response(input).unwrap();
        assert_eq!(parsed.key, "value");
    }

    #[test]
    fn test_fence_with_other_language_tag() {
        let input = "```JSON\n{\"key\": \"value\"}\n```";
        let parsed: Sample = parse_structured_response(input).unwrap();
        assert_eq!(parsed.key, "value");
    }

    #[test]
    fn test_brace_span_inside_prose() {
        let input = "Sure! The analysis is {\"key\": \"value\"} as requested.";
        let parsed: Sample = parse_structured_response(input).unwrap();
        assert_eq!(parsed.key, "value");
    }

    #[test]
    fn test_no_json_is_typed_failure() {
        let err = parse_structured_response::<Value>("I cannot help with that.").unwrap_err();
        assert!(matches!(err, StructuredParseError::Invalid(_)));

        let err = parse_structured_response::<Value>("   ").unwrap_err();
        assert!(matches!(err, StructuredParseError::NoJson));
    }

    #[test]
    fn test_wrong_shape_is_invalid() {
        let err = parse_structured_response::<Sample>("{\"other\": 1}").unwrap_err();
        assert!(matches!(err, StructuredParseError::Invalid(_)));
    }

    #[test]
    fn test_fenced_block_returns_none_without_closing_fence() {
        assert!(fenced_block("```json\n{\"key\": 1}", "```json").is_none());
    }
}
