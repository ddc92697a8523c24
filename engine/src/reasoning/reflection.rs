//! Reflection verdict parsing
//!
//! The reviewing model is asked for JSON but may wrap it in prose or a code
//! fence, use snake_case keys, or ignore the request entirely. Anything that
//! cannot be read becomes a `Parse` error, which the chain engine replaces
//! with `ReflectionVerdict::fail_open()`.

use sdk::OrchestrationError;
use serde::{Deserialize, Serialize};

use crate::llm::extract_json_object;

/// The reviewer's judgement of one execution response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflectionVerdict {
    #[serde(alias = "is_valid", alias = "valid")]
    pub is_valid: bool,

    pub confidence: f64,

    #[serde(default, alias = "suggestions")]
    pub improvements: Vec<String>,

    #[serde(default, alias = "should_retry")]
    pub should_retry: bool,
}

impl ReflectionVerdict {
    /// Verdict used when the reviewer's reply is unreadable
    pub fn fail_open() -> Self {
        Self {
            is_valid: true,
            confidence: 0.5,
            improvements: Vec::new(),
            should_retry: false,
        }
    }
}

/// Read a verdict out of a reviewer reply
pub fn parse_verdict(reply: &str) -> Result<ReflectionVerdict, OrchestrationError> {
    let value = extract_json_object(reply)
        .ok_or_else(|| OrchestrationError::Parse("no JSON object in reflection".to_string()))?;

    let mut verdict: ReflectionVerdict = serde_json::from_value(value)
        .map_err(|e| OrchestrationError::Parse(format!("malformed reflection verdict: {}", e)))?;

    if !verdict.confidence.is_finite() {
        return Err(OrchestrationError::Parse(
            "reflection confidence is not a number".to_string(),
        ));
    }
    verdict.confidence = verdict.confidence.clamp(0.0, 1.0);

    Ok(verdict)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_camel_case() {
        let v = parse_verdict(
            r#"{"isValid": false, "confidence": 0.4, "improvements": ["add prices"], "shouldRetry": true}"#,
        )
        .unwrap();
        assert!(!v.is_valid);
        assert!(v.should_retry);
        assert_eq!(v.improvements, vec!["add prices".to_string()]);
    }

    #[test]
    fn test_parse_snake_case_in_fence() {
        let v = parse_verdict("Sure.\n```json\n{\"is_valid\": true, \"confidence\": 0.93}\n```").unwrap();
        assert!(v.is_valid);
        assert!(!v.should_retry);
        assert!(v.improvements.is_empty());
    }

    #[test]
    fn test_confidence_is_clamped() {
        let v = parse_verdict(r#"{"isValid": true, "confidence": 7}"#).unwrap();
        assert_eq!(v.confidence, 1.0);
    }

    #[test]
    fn test_unreadable_reply_is_parse_error() {
        for reply in ["Looks good!", r#"{"confidence": "high"}"#, r#"{"isValid": true}"#] {
            let err = parse_verdict(reply).unwrap_err();
            assert!(matches!(err, OrchestrationError::Parse(_)), "{}", reply);
        }
    }

    #[test]
    fn test_fail_open_default() {
        let v = ReflectionVerdict::fail_open();
        assert!(v.is_valid);
        assert_eq!(v.confidence, 0.5);
        assert!(!v.should_retry);
    }
}
