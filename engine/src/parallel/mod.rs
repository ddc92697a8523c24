//! Parallel Execution Coordinator
//!
//! Runs independent reasoning chains at the same time, bounded by a
//! semaphore, and consolidates what they produce. Each chain gets its own
//! timeout once it holds a permit; a chain that times out is counted as
//! failed and its siblings carry on. Chains start in priority order.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::ParallelConfig;
use crate::reasoning::ChainEngine;

pub mod merge;

pub use merge::{MergeStrategy, MERGE_DELIMITER};

fn default_weight() -> f64 {
    1.0
}

/// One chain to run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainRequest {
    pub id: String,
    pub intent: String,
    #[serde(default)]
    pub context: serde_json::Value,
    /// Tie-breaker for `best`
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Higher runs first
    #[serde(default)]
    pub priority: i32,
    /// A failure here fails the whole run
    #[serde(default)]
    pub required: bool,
}

impl ChainRequest {
    pub fn new(id: impl Into<String>, intent: impl Into<String>, context: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            intent: intent.into(),
            context,
            weight: default_weight(),
            priority: 0,
            required: false,
        }
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A batch of chains and how to combine them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelRequest {
    pub chains: Vec<ChainRequest>,
    #[serde(default)]
    pub strategy: MergeStrategy,
}

/// Outcome of one chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainResult {
    pub id: String,
    pub success: bool,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelMetrics {
    pub total_ms: u64,
    /// Confidence of every chain that succeeded
    pub chain_confidences: BTreeMap<String, f64>,
    /// Chains that contributed to the answer
    pub chains_used: usize,
    pub chains_failed: usize,
}

/// Consolidated result of a parallel run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelOutcome {
    pub success: bool,
    pub strategy: MergeStrategy,
    pub response: String,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Per-chain results in request order
    pub chains: Vec<ChainResult>,
    pub metrics: ParallelMetrics,
}

/// Runs reasoning chains concurrently under a concurrency cap
#[derive(Clone)]
pub struct ParallelCoordinator {
    engine: ChainEngine,
    max_concurrency: usize,
    timeout: Duration,
}

impl ParallelCoordinator {
    pub fn new(engine: ChainEngine, max_concurrency: usize, timeout: Duration) -> Self {
        Self {
            engine,
            max_concurrency: max_concurrency.max(1),
            timeout,
        }
    }

    pub fn from_config(engine: ChainEngine, config: &ParallelConfig) -> Self {
        Self::new(
            engine,
            config.max_concurrency,
            Duration::from_millis(config.timeout_ms),
        )
    }

    /// Run every chain and consolidate the successful ones
    ///
    /// `success` is false when a required chain failed or nothing succeeded.
    pub async fn execute(&self, request: ParallelRequest) -> ParallelOutcome {
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));

        // Stable sort: equal priorities keep request order
        let mut order: Vec<usize> = (0..request.chains.len()).collect();
        order.sort_by_key(|&i| std::cmp::Reverse(request.chains[i].priority));

        info!(
            chains = request.chains.len(),
            max_concurrency = self.max_concurrency,
            strategy = %request.strategy,
            "Starting parallel chains"
        );

        let runs = order.iter().map(|&i| {
            let chain = &request.chains[i];
            let semaphore = semaphore.clone();
            async move { (i, self.run_chain(chain, semaphore).await) }
        });
        let mut finished = join_all(runs).await;
        finished.sort_by_key(|(i, _)| *i);
        let chains: Vec<ChainResult> = finished.into_iter().map(|(_, r)| r).collect();

        let failed_required: Vec<&str> = chains
            .iter()
            .filter(|c| c.required && !c.success)
            .map(|c| c.id.as_str())
            .collect();

        let merged = merge::consolidate(request.strategy, &chains);

        let error = if !failed_required.is_empty() {
            Some(format!("required chains failed: {}", failed_required.join(", ")))
        } else if merged.is_none() {
            Some("no chain produced a result".to_string())
        } else {
            None
        };

        let metrics = ParallelMetrics {
            total_ms: started.elapsed().as_millis() as u64,
            chain_confidences: chains
                .iter()
                .filter_map(|c| c.confidence.map(|conf| (c.id.clone(), conf)))
                .collect(),
            chains_used: merged.as_ref().map_or(0, |m| m.contributors.len()),
            chains_failed: chains.iter().filter(|c| !c.success).count(),
        };

        info!(
            success = error.is_none(),
            chains_used = metrics.chains_used,
            chains_failed = metrics.chains_failed,
            total_ms = metrics.total_ms,
            "Parallel chains finished"
        );

        let (response, confidence) = merged
            .map(|m| (m.response, m.confidence))
            .unwrap_or_default();

        ParallelOutcome {
            success: error.is_none(),
            strategy: request.strategy,
            response,
            confidence,
            error,
            chains,
            metrics,
        }
    }

    async fn run_chain(&self, chain: &ChainRequest, semaphore: Arc<Semaphore>) -> ChainResult {
        let failed = |error: String, duration_ms: u64| ChainResult {
            id: chain.id.clone(),
            success: false,
            required: chain.required,
            response: None,
            confidence: None,
            weight: chain.weight,
            error: Some(error),
            duration_ms,
        };

        let _permit = match semaphore.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return failed("coordinator shut down".to_string(), 0),
        };

        debug!(chain = %chain.id, "Chain acquired slot");
        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, self.engine.run(&chain.intent, &chain.context)).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(outcome)) => ChainResult {
                id: chain.id.clone(),
                success: true,
                required: chain.required,
                response: Some(outcome.final_response),
                confidence: Some(outcome.confidence),
                weight: chain.weight,
                error: None,
                duration_ms,
            },
            Ok(Err(e)) => {
                warn!(chain = %chain.id, "Chain failed: {}", e);
                failed(e.to_string(), duration_ms)
            }
            Err(_) => {
                warn!(chain = %chain.id, "Chain timed out after {}ms", self.timeout.as_millis());
                failed(
                    format!("Timed out: chain exceeded {}ms", self.timeout.as_millis()),
                    duration_ms,
                )
            }
        }
    }
}
