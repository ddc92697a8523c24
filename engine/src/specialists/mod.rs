//! Bespoke specialist handlers
//!
//! Agents listed here get dedicated logic on top of the reasoning engines.
//! Every other agent is served by the generic handler.

use std::sync::Arc;

use crate::config::Config;
use crate::dispatcher::DispatcherBuilder;
use crate::llm::CompletionService;
use crate::parallel::ParallelCoordinator;
use crate::reasoning::{ChainConfig, ChainEngine};
use crate::registry::Registry;

pub mod deal_analyst;
pub mod trip_planner;

pub use deal_analyst::DealAnalyst;
pub use trip_planner::TripPlanner;

/// Register the built-in specialists on `builder`
pub fn register_defaults(
    builder: DispatcherBuilder,
    registry: &Registry,
    completion: Arc<dyn CompletionService>,
    config: &Config,
) -> DispatcherBuilder {
    let model_of = |id: &str| registry.get(id).and_then(|agent| agent.model.clone());

    let chain_config = ChainConfig::from_config(
        &config.reasoning,
        std::time::Duration::from_secs(config.llm.timeout_secs),
    );

    let planner_engine = ChainEngine::new(
        Arc::clone(&completion),
        chain_config.clone().with_model(model_of(trip_planner::AGENT_ID)),
    );
    let analyst_engine = ChainEngine::new(
        completion,
        chain_config.with_model(model_of(deal_analyst::AGENT_ID)),
    );

    builder
        .handler(Arc::new(TripPlanner::new(planner_engine)))
        .handler(Arc::new(DealAnalyst::new(ParallelCoordinator::from_config(
            analyst_engine,
            &config.parallel,
        ))))
}
