//! Integration tests for reasoning chains against a completion service

mod common;

use common::{is_reflection, MockCompletion};
use concierge_engine::llm::LLMError;
use concierge_engine::reasoning::{ChainConfig, ChainEngine, StepKind, TemplateKind};
use sdk::OrchestrationError;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn engine(completion: Arc<MockCompletion>, max_iterations: u32) -> ChainEngine {
    let mut config = ChainConfig::default();
    config.max_iterations = max_iterations;
    ChainEngine::new(completion, config)
}

#[tokio::test]
async fn test_single_iteration_without_retry() {
    let completion = Arc::new(MockCompletion::new(|request| {
        if is_reflection(request) {
            Ok(r#"{"isValid": false, "confidence": 0.3, "shouldRetry": true}"#.to_string())
        } else {
            Ok("Lisbon in three days: Alfama, Belem, Sintra.".to_string())
        }
    }));

    let outcome = engine(completion.clone(), 1)
        .run("plan_trip", &json!({"destination": "Lisbon"}))
        .await
        .unwrap();

    assert_eq!(outcome.metadata.iterations, 1);
    assert_eq!(outcome.steps_of(StepKind::Execution), 1);
    assert_eq!(outcome.reasoning.len(), 3);
    assert!(!outcome.fallback_used);
    assert_eq!(completion.calls(), 2);
}

#[tokio::test]
async fn test_unreadable_verdict_fails_open() {
    let completion = Arc::new(MockCompletion::new(|request| {
        if is_reflection(request) {
            Ok("Looks fine to me.".to_string())
        } else {
            Ok("Compare fares across the week and book midweek.".to_string())
        }
    }));

    let outcome = engine(completion.clone(), 3)
        .run("compare_prices", &json!({}))
        .await
        .unwrap();

    // fail-open verdicts never ask for a retry
    assert_eq!(outcome.metadata.iterations, 1);
    assert!(outcome.metadata.verdict.is_valid);
    assert_eq!(outcome.metadata.verdict.confidence, 0.5);
    assert_eq!(outcome.metadata.template, TemplateKind::Analysis);
}

#[tokio::test]
async fn test_reflection_failure_fails_open() {
    let completion = Arc::new(MockCompletion::new(|request| {
        if is_reflection(request) {
            Err(LLMError::ProviderUnavailable("reviewer offline".to_string()))
        } else {
            Ok("Pack layers; evenings are cool by the coast.".to_string())
        }
    }));

    let outcome = engine(completion, 3).run("anything", &json!({})).await.unwrap();

    assert_eq!(outcome.final_response, "Pack layers; evenings are cool by the coast.");
    let reflection = outcome
        .reasoning
        .iter()
        .find(|s| s.kind == StepKind::Reflection)
        .unwrap();
    assert!(reflection.response.is_none());
}

#[tokio::test]
async fn test_retry_prompt_carries_previous_answer() {
    let completion = Arc::new(MockCompletion::new(|request| {
        if is_reflection(request) {
            if request.user_prompt.contains("draft") {
                Ok(r#"{"isValid": false, "confidence": 0.2, "improvements": ["add prices"], "shouldRetry": true}"#.to_string())
            } else {
                Ok(r#"{"isValid": true, "confidence": 0.9}"#.to_string())
            }
        } else if request.user_prompt.contains("add prices") {
            Ok("final plan with prices".to_string())
        } else {
            Ok("draft plan".to_string())
        }
    }));

    let outcome = engine(completion.clone(), 3)
        .run("plan_trip", &json!({}))
        .await
        .unwrap();

    assert_eq!(outcome.final_response, "final plan with prices");
    assert!(outcome.fallback_used);
    assert_eq!(outcome.metadata.iterations, 2);
    assert_eq!(completion.calls(), 4);
}

#[tokio::test]
async fn test_call_timeout_is_timeout_error() {
    let completion = Arc::new(
        MockCompletion::answering("too late").with_delay(Duration::from_millis(200)),
    );
    let mut config = ChainConfig::default();
    config.call_timeout = Duration::from_millis(20);

    let err = ChainEngine::new(completion, config)
        .run("plan_trip", &json!({}))
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestrationError::Timeout(_)));
}

#[tokio::test]
async fn test_invalid_verdict_without_retry_stops_early() {
    let completion = Arc::new(MockCompletion::new(|request| {
        if is_reflection(request) {
            Ok(r#"{"isValid": false, "confidence": 0.2, "shouldRetry": false}"#.to_string())
        } else {
            Ok("Porto for two days: Ribeira, then a port cellar in Gaia.".to_string())
        }
    }));

    let outcome = engine(completion.clone(), 3)
        .run("plan_trip", &json!({"destination": "Porto"}))
        .await
        .unwrap();

    assert_eq!(outcome.metadata.iterations, 1);
    assert_eq!(outcome.steps_of(StepKind::Execution), 1);
    assert!(!outcome.fallback_used);
    assert!(!outcome.metadata.verdict.is_valid);
    assert_eq!(
        outcome.final_response,
        "Porto for two days: Ribeira, then a port cellar in Gaia."
    );
    assert_eq!(completion.calls(), 2);
}
