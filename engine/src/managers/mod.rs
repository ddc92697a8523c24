//! Manager / Delegation Layer
//!
//! Agents with a supervision tier of 1-3 are managers. When the dispatcher
//! routes an intent to one, the invoker wraps the descriptor in a
//! [`Manager`] for that single request and hands it to the agent's
//! [`ManagerHandler`]. The manager can:
//!
//! - hand the work to one subordinate (`delegate_task`)
//! - fan it out to several and gather the results (`coordinate_multi_agent_task`)
//! - report a failure upward (`escalate_to_supervisor`)
//! - leave an audit trail (`log_activity`)
//!
//! Delegations never create ledger rows of their own; they run under the
//! task the dispatcher opened. Memory updates returned by subordinates are
//! held on the `Manager` and applied with the rest of the task's updates
//! once the whole task succeeds.

use async_trait::async_trait;
use sdk::{HandlerOutput, HandlerRequest, OrchestrationError};
use serde_json::json;
use std::sync::{Arc, Mutex};

use crate::db::ScopedUpdate;
use crate::dispatcher::invoker::AgentInvoker;
use crate::message_bus::MessageBus;
use crate::registry::AgentDescriptor;

pub mod coordinator;
pub mod escalation;

pub use coordinator::CoordinationResult;

/// Handles intents addressed to one manager agent
#[async_trait]
pub trait ManagerHandler: Send + Sync {
    /// Catalog id of the manager this handler serves
    fn agent_id(&self) -> &str;

    async fn handle(
        &self,
        manager: &Manager,
        request: HandlerRequest,
    ) -> Result<HandlerOutput, OrchestrationError>;
}

/// One manager acting on one request
pub struct Manager {
    descriptor: Arc<AgentDescriptor>,
    invoker: Arc<AgentInvoker>,
    bus: MessageBus,
    task_id: String,
    /// Subordinate memory updates, applied only if the task succeeds
    pending: Mutex<Vec<ScopedUpdate>>,
}

impl Manager {
    pub(crate) fn new(
        descriptor: Arc<AgentDescriptor>,
        invoker: Arc<AgentInvoker>,
        bus: MessageBus,
        task_id: impl Into<String>,
    ) -> Self {
        Self {
            descriptor,
            invoker,
            bus,
            task_id: task_id.into(),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Read this manager's own memory for `requester_id`
    pub async fn recall(
        &self,
        requester_id: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, OrchestrationError> {
        use sdk::MemoryView;
        self.invoker
            .memory()
            .scoped(self.id(), requester_id)
            .recall(key)
            .await
    }

    /// Answer the request with a single completion call in this manager's role
    pub async fn answer_directly(
        &self,
        request: &HandlerRequest,
    ) -> Result<HandlerOutput, OrchestrationError> {
        self.invoker.generic().handle(&self.descriptor, request).await
    }

    fn hold_updates(&self, updates: Vec<ScopedUpdate>) {
        if updates.is_empty() {
            return;
        }
        if let Ok(mut pending) = self.pending.lock() {
            pending.extend(updates);
        }
    }

    pub(crate) fn take_updates(&self) -> Vec<ScopedUpdate> {
        self.pending
            .lock()
            .map(|mut pending| std::mem::take(&mut *pending))
            .unwrap_or_default()
    }
}

/// Default handler for managers without a bespoke one
///
/// An intent naming one of the manager's capabilities goes to that
/// capability's delegates: a single delegate through `delegate_task`,
/// several through `coordinate_multi_agent_task`. Anything else is answered
/// by the generic completion path in the manager's own role.
pub struct CapabilityRouter {
    agent_id: String,
}

impl CapabilityRouter {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
        }
    }
}

#[async_trait]
impl ManagerHandler for CapabilityRouter {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    async fn handle(
        &self,
        manager: &Manager,
        request: HandlerRequest,
    ) -> Result<HandlerOutput, OrchestrationError> {
        let delegates = manager
            .descriptor()
            .capability(&request.intent)
            .map(|c| c.delegate_agents.clone())
            .unwrap_or_default();

        match delegates.as_slice() {
            [] => manager.answer_directly(&request).await,
            [only] => {
                let result = manager
                    .delegate_task(&request.requester_id, only, &request.intent, request.params.clone())
                    .await?;
                Ok(HandlerOutput::new(json!({
                    "delegatedTo": only,
                    "result": result,
                })))
            }
            several => {
                let coordinated = manager
                    .coordinate_multi_agent_task(
                        &request.requester_id,
                        several,
                        &request.intent,
                        request.params.clone(),
                    )
                    .await?;

                if !coordinated.success {
                    return Err(OrchestrationError::HandlerFailure(format!(
                        "no delegate completed '{}': {}",
                        request.intent,
                        coordinated.failure_summary()
                    )));
                }

                let result = serde_json::to_value(&coordinated)
                    .map_err(|e| OrchestrationError::HandlerFailure(e.to_string()))?;
                Ok(HandlerOutput::new(result))
            }
        }
    }
}
