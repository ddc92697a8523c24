//! Generic handler
//!
//! Every catalog agent without a bespoke handler is answered by one
//! completion call using a role prompt for that agent. This keeps every
//! registered agent callable.

use sdk::{HandlerOutput, HandlerRequest, OrchestrationError};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::prompts;
use crate::llm::{CompletionRequest, CompletionService};
use crate::registry::AgentDescriptor;

pub struct GenericHandler {
    completion: Arc<dyn CompletionService>,
    max_tokens: u32,
    call_timeout: Duration,
}

impl GenericHandler {
    pub fn new(completion: Arc<dyn CompletionService>, max_tokens: u32, call_timeout: Duration) -> Self {
        Self {
            completion,
            max_tokens,
            call_timeout,
        }
    }

    /// Answer `request` in the role of `descriptor`
    pub async fn handle(
        &self,
        descriptor: &AgentDescriptor,
        request: &HandlerRequest,
    ) -> Result<HandlerOutput, OrchestrationError> {
        let completion = CompletionRequest::new(
            prompts::system_prompt_for(descriptor),
            prompts::user_prompt(&request.intent, &request.params),
            self.max_tokens,
        )
        .with_model(descriptor.model.clone());

        debug!(agent = %descriptor.id, provider = %self.completion.name(), "Generic completion");

        let text = tokio::time::timeout(self.call_timeout, self.completion.complete(&completion))
            .await
            .map_err(|_| {
                OrchestrationError::Timeout(format!(
                    "{} did not answer within {}s",
                    descriptor.id,
                    self.call_timeout.as_secs()
                ))
            })??;

        Ok(HandlerOutput::new(json!({ "response": text })))
    }
}
