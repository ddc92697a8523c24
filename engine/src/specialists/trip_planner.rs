//! Trip planner: itineraries through the chained-reasoning engine

use async_trait::async_trait;
use sdk::{AgentHandler, HandlerOutput, HandlerRequest, MemoryUpdate, MemoryView, OrchestrationError};
use serde_json::json;
use tracing::debug;

use crate::reasoning::{ChainEngine, StepKind};

pub const AGENT_ID: &str = "trip-planner";

/// Memory key holding the requester's most recent itinerary
pub const LAST_ITINERARY: &str = "last_itinerary";

/// How long a remembered itinerary stays relevant
const ITINERARY_TTL_HOURS: i64 = 24;

pub struct TripPlanner {
    engine: ChainEngine,
}

impl TripPlanner {
    pub fn new(engine: ChainEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl AgentHandler for TripPlanner {
    fn agent_id(&self) -> &str {
        AGENT_ID
    }

    async fn handle(
        &self,
        request: HandlerRequest,
        memory: &dyn MemoryView,
    ) -> Result<HandlerOutput, OrchestrationError> {
        let mut context = match &request.params {
            serde_json::Value::Object(map) => map.clone(),
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("details".to_string(), other.clone());
                map
            }
        };

        // a follow-up request ("make day 2 shorter") builds on the last plan
        if let Some(previous) = memory.recall(LAST_ITINERARY).await? {
            debug!(requester = %request.requester_id, "Including previous itinerary");
            context.insert("previous_itinerary".to_string(), previous);
        }

        let outcome = self
            .engine
            .run(&request.intent, &serde_json::Value::Object(context))
            .await?;

        let destination = request.param_str("destination").map(str::to_string);

        let result = json!({
            "destination": destination,
            "itinerary": outcome.final_response,
            "confidence": outcome.confidence,
            "fallbackUsed": outcome.fallback_used,
            "iterations": outcome.metadata.iterations,
            "executionSteps": outcome.steps_of(StepKind::Execution),
        });

        let remembered = MemoryUpdate::new(
            LAST_ITINERARY,
            json!({
                "destination": destination,
                "itinerary": outcome.final_response,
            }),
        )
        .expires_in(chrono::Duration::hours(ITINERARY_TTL_HOURS));

        Ok(HandlerOutput::new(result).with_memory(remembered))
    }
}
