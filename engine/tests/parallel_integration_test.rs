//! Integration tests for parallel chain execution

mod common;

use common::{is_reflection, MockCompletion};
use concierge_engine::reasoning::{ChainConfig, ChainEngine};
use concierge_engine::parallel::{ChainRequest, MergeStrategy, ParallelCoordinator, ParallelRequest};
use concierge_engine::llm::LLMError;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Each chain answers with its own marker; the reviewer's confidence depends
/// on which marker it sees
fn per_perspective() -> Arc<MockCompletion> {
    Arc::new(MockCompletion::new(|request| {
        let prompt = &request.user_prompt;
        let marker = ["alpha", "bravo", "gamma", "delta"]
            .into_iter()
            .find(|m| prompt.contains(m))
            .unwrap_or("none");

        if is_reflection(request) {
            let confidence = match marker {
                "alpha" => 0.4,
                "bravo" => 0.9,
                "gamma" => 0.6,
                _ => 0.5,
            };
            Ok(format!(
                r#"{{"isValid": true, "confidence": {}, "shouldRetry": false}}"#,
                confidence
            ))
        } else if marker == "delta" {
            Err(LLMError::ProviderUnavailable("delta is down".to_string()))
        } else {
            Ok(format!("answer from {}", marker))
        }
    }))
}

fn coordinator(completion: Arc<MockCompletion>, max_concurrency: usize, timeout_ms: u64) -> ParallelCoordinator {
    ParallelCoordinator::new(
        ChainEngine::new(completion, ChainConfig::default()),
        max_concurrency,
        Duration::from_millis(timeout_ms),
    )
}

fn chain(id: &str) -> ChainRequest {
    ChainRequest::new(id, "analyze_offer", json!({ "perspective": id }))
}

#[tokio::test]
async fn test_best_picks_most_confident_chain() {
    let outcome = coordinator(per_perspective(), 3, 5_000)
        .execute(ParallelRequest {
            chains: vec![chain("alpha"), chain("bravo"), chain("gamma")],
            strategy: MergeStrategy::Best,
        })
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.response, "answer from bravo");
    assert_eq!(outcome.metrics.chains_used, 1);
    assert_eq!(outcome.metrics.chains_failed, 0);
    assert_eq!(outcome.metrics.chain_confidences.len(), 3);

    let bravo = outcome.metrics.chain_confidences["bravo"];
    assert!(outcome
        .metrics
        .chain_confidences
        .values()
        .all(|&c| c <= bravo));
}

#[tokio::test]
async fn test_merge_keeps_request_order() {
    let outcome = coordinator(per_perspective(), 3, 5_000)
        .execute(ParallelRequest {
            chains: vec![
                chain("gamma"),
                chain("alpha").priority(5),
                chain("bravo"),
            ],
            strategy: MergeStrategy::Merge,
        })
        .await;

    assert!(outcome.success);
    let ids: Vec<&str> = outcome.chains.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["gamma", "alpha", "bravo"]);
    assert_eq!(outcome.response.matches("answer from").count(), 3);
    assert_eq!(outcome.metrics.chains_used, 3);
}

#[tokio::test]
async fn test_optional_failure_is_tolerated() {
    let outcome = coordinator(per_perspective(), 2, 5_000)
        .execute(ParallelRequest {
            chains: vec![chain("alpha"), chain("delta")],
            strategy: MergeStrategy::Consensus,
        })
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.metrics.chains_failed, 1);
    let delta = outcome.chains.iter().find(|c| c.id == "delta").unwrap();
    assert!(!delta.success);
    assert!(delta.error.as_deref().unwrap().contains("delta is down"));
}

#[tokio::test]
async fn test_required_failure_fails_the_run() {
    let outcome = coordinator(per_perspective(), 2, 5_000)
        .execute(ParallelRequest {
            chains: vec![chain("alpha"), chain("delta").required()],
            strategy: MergeStrategy::Best,
        })
        .await;

    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("delta"));
    // the surviving chain is still reported
    assert!(outcome.chains.iter().any(|c| c.id == "alpha" && c.success));
}

#[tokio::test]
async fn test_slow_chains_time_out() {
    let completion = Arc::new(
        MockCompletion::answering("eventually").with_delay(Duration::from_millis(300)),
    );

    let outcome = coordinator(completion, 3, 50)
        .execute(ParallelRequest {
            chains: vec![chain("alpha"), chain("bravo")],
            strategy: MergeStrategy::Best,
        })
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.metrics.chains_failed, 2);
    assert!(outcome
        .chains
        .iter()
        .all(|c| c.error.as_deref().unwrap().starts_with("Timed out")));
}

#[tokio::test]
async fn test_concurrency_cap_serializes_chains() {
    let delay = Duration::from_millis(60);
    let chains = || vec![chain("alpha"), chain("bravo"), chain("gamma")];

    let capped = coordinator(
        Arc::new(MockCompletion::answering("steady answer").with_delay(delay)),
        1,
        5_000,
    )
    .execute(ParallelRequest {
        chains: chains(),
        strategy: MergeStrategy::Consensus,
    })
    .await;

    // three chains, two calls each, one at a time
    assert!(capped.success);
    assert!(capped.metrics.total_ms >= 6 * 60);

    let open = coordinator(
        Arc::new(MockCompletion::answering("steady answer").with_delay(delay)),
        3,
        5_000,
    )
    .execute(ParallelRequest {
        chains: chains(),
        strategy: MergeStrategy::Consensus,
    })
    .await;

    assert!(open.success);
    assert!(open.metrics.total_ms < capped.metrics.total_ms);
}
