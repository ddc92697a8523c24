//! Agent handler trait and the memory view handed to handlers
//!
//! Specialist handlers implement `AgentHandler`. They never write memory
//! directly: they return `MemoryUpdate` intents in their `HandlerOutput` and
//! the engine applies them only after the owning task succeeds. Reads go
//! through a `MemoryView` that is already scoped to the handler's own
//! `(agent_id, requester_id)` pair.

use crate::errors::OrchestrationError;
use crate::types::{HandlerOutput, HandlerRequest};
use async_trait::async_trait;

/// Read-only access to the calling agent's memory for the current requester
#[async_trait]
pub trait MemoryView: Send + Sync {
    /// Read a key; expired entries read as `None`
    async fn recall(&self, key: &str) -> Result<Option<serde_json::Value>, OrchestrationError>;
}

/// Trait that all specialist agent handlers must implement
#[async_trait]
pub trait AgentHandler: Send + Sync {
    /// Catalog id of the agent this handler serves
    fn agent_id(&self) -> &str;

    /// Check a submission before a task is recorded for it
    ///
    /// Runs at admission for direct submissions only. Errors are returned
    /// to the caller and never reach the ledger.
    fn validate(&self, _intent: &str, _params: &serde_json::Value) -> Result<(), OrchestrationError> {
        Ok(())
    }

    /// Handle one intent for one requester
    async fn handle(
        &self,
        request: HandlerRequest,
        memory: &dyn MemoryView,
    ) -> Result<HandlerOutput, OrchestrationError>;
}

/// A `MemoryView` with nothing in it
pub struct EmptyMemory;

#[async_trait]
impl MemoryView for EmptyMemory {
    async fn recall(&self, _key: &str) -> Result<Option<serde_json::Value>, OrchestrationError> {
        Ok(None)
    }
}
