//! Deal analyst: several perspectives on one offer, run in parallel
//!
//! The price perspective is required; without it there is no verdict worth
//! returning. Convenience and value only enrich the answer.

use async_trait::async_trait;
use sdk::{AgentHandler, HandlerOutput, HandlerRequest, MemoryUpdate, MemoryView, OrchestrationError};
use serde_json::json;

use crate::parallel::{ChainRequest, MergeStrategy, ParallelCoordinator, ParallelRequest};

pub const AGENT_ID: &str = "deal-analyst";

pub const LAST_ANALYSIS: &str = "last_analysis";

const ANALYSIS_TTL_DAYS: i64 = 7;

/// (id, question, priority, weight, required)
const PERSPECTIVES: &[(&str, &str, i32, f64, bool)] = &[
    (
        "price",
        "analyze the price of this deal against typical market prices",
        2,
        1.5,
        true,
    ),
    (
        "value",
        "analyze the overall value of this deal: what is included and what is not",
        1,
        1.0,
        false,
    ),
    (
        "convenience",
        "analyze the convenience of this deal: schedule, connections and flexibility",
        0,
        0.8,
        false,
    ),
];

pub struct DealAnalyst {
    coordinator: ParallelCoordinator,
}

impl DealAnalyst {
    pub fn new(coordinator: ParallelCoordinator) -> Self {
        Self { coordinator }
    }

    fn build_request(offer: &serde_json::Value, strategy: MergeStrategy) -> ParallelRequest {
        let chains = PERSPECTIVES
            .iter()
            .map(|&(id, question, priority, weight, required)| {
                let chain = ChainRequest::new(
                    id,
                    question,
                    json!({ "offer": offer, "perspective": id }),
                )
                .priority(priority)
                .weight(weight);
                if required {
                    chain.required()
                } else {
                    chain
                }
            })
            .collect();

        ParallelRequest { chains, strategy }
    }

    /// The offer to analyse and the merge strategy asked for
    fn read_params(
        params: &serde_json::Value,
    ) -> Result<(serde_json::Value, MergeStrategy), OrchestrationError> {
        let offer = params
            .get("offer")
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| OrchestrationError::Validation("'offer' is required".to_string()))?;

        let strategy = match params.get("strategy").and_then(|v| v.as_str()) {
            Some(s) => s.parse().map_err(OrchestrationError::Validation)?,
            None => MergeStrategy::default(),
        };

        Ok((offer, strategy))
    }
}

#[async_trait]
impl AgentHandler for DealAnalyst {
    fn agent_id(&self) -> &str {
        AGENT_ID
    }

    fn validate(&self, _intent: &str, params: &serde_json::Value) -> Result<(), OrchestrationError> {
        Self::read_params(params).map(|_| ())
    }

    async fn handle(
        &self,
        request: HandlerRequest,
        _memory: &dyn MemoryView,
    ) -> Result<HandlerOutput, OrchestrationError> {
        // delegated requests skip admission, so check again
        let (offer, strategy) = Self::read_params(&request.params)?;

        let outcome = self
            .coordinator
            .execute(Self::build_request(&offer, strategy))
            .await;

        if !outcome.success {
            return Err(OrchestrationError::HandlerFailure(
                outcome
                    .error
                    .unwrap_or_else(|| "deal analysis failed".to_string()),
            ));
        }

        let summary = MemoryUpdate::new(
            LAST_ANALYSIS,
            json!({ "offer": offer, "confidence": outcome.confidence, "strategy": strategy }),
        )
        .expires_in(chrono::Duration::days(ANALYSIS_TTL_DAYS));

        let result = json!({
            "analysis": outcome.response,
            "confidence": outcome.confidence,
            "strategy": strategy,
            "metrics": outcome.metrics,
        });

        Ok(HandlerOutput::new(result).with_memory(summary))
    }
}
