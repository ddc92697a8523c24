//! Completion Service Abstraction Layer
//!
//! Agents and the reasoning engine never talk to a model vendor directly.
//! They build a `CompletionRequest` (system prompt, user prompt, optional
//! model, token ceiling) and hand it to a `CompletionService`. Ollama,
//! OpenAI-compatible and Anthropic backends implement the trait, and the
//! `CompletionRouter` chains them with failover.
//!
//! Replies are arbitrary text. Callers that expect structured data use
//! `extract_json_object`, which degrades to `None` instead of failing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod anthropic;
pub mod ollama;
pub mod openai;
pub mod router;

/// Result type for completion operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during completion calls
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<LLMError> for sdk::OrchestrationError {
    fn from(e: LLMError) -> Self {
        match e {
            LLMError::Timeout => sdk::OrchestrationError::Timeout("completion call".to_string()),
            other => sdk::OrchestrationError::Completion(other.to_string()),
        }
    }
}

/// One prompt/response exchange with a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    /// Overrides the provider's configured model when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            model: None,
            max_tokens,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

/// Completion Service trait that every backend and the router implement
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Returns the name of the backend (e.g., "ollama", "openai", "router")
    fn name(&self) -> &str;

    /// Returns true for backends running on this machine
    fn is_local(&self) -> bool {
        false
    }

    /// Produce the model's text reply
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Check if the backend is currently usable
    async fn check_health(&self) -> bool {
        true
    }
}

/// Map a non-success HTTP status to an error the router can log
pub(crate) fn status_error(status: reqwest::StatusCode, body: String) -> LLMError {
    match status.as_u16() {
        401 | 403 => LLMError::AuthenticationFailed(body),
        429 => LLMError::RateLimitExceeded,
        500..=599 => LLMError::ProviderUnavailable(format!("{}: {}", status, body)),
        _ => LLMError::InvalidRequest(body),
    }
}

/// Pull a JSON object out of free-form model output.
///
/// Handles, in order:
/// 1. The whole reply being a JSON object
/// 2. A markdown code fence, with or without trailing prose
/// 3. The first balanced `{...}` embedded in prose
pub fn extract_json_object(content: &str) -> Option<serde_json::Value> {
    let trimmed = content.trim();

    if let Some(value) = parse_object(trimmed) {
        return Some(value);
    }

    if let Some(inner) = extract_fenced_json(trimmed) {
        if let Some(value) = parse_object(inner.trim()) {
            return Some(value);
        }
    }

    let mut search_from = 0;
    while let Some(offset) = trimmed[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(candidate) = extract_balanced_json(&trimmed[start..]) {
            if let Some(value) = parse_object(candidate) {
                return Some(value);
            }
        }
        search_from = start + 1;
    }

    None
}

fn parse_object(s: &str) -> Option<serde_json::Value> {
    serde_json::from_str::<serde_json::Value>(s)
        .ok()
        .filter(|v| v.is_object())
}

/// Extract the body of the first markdown code fence in the text.
///
/// Works even when there is trailing prose after the closing ```.
fn extract_fenced_json(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Extract a balanced JSON object starting at position 0 of `s`.
///
/// Counts `{` / `}` depth, respecting string literals, to find the
/// matching close brace.
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
