//! Handler resolution and invocation
//!
//! Handlers are registered by agent id when the dispatcher is built. At call
//! time the invoker picks, in order:
//!
//! 1. a registered `ManagerHandler` for manager-tier agents, else a
//!    `CapabilityRouter`
//! 2. a registered `AgentHandler` for everyone else
//! 3. the `GenericHandler`
//!
//! Ids are checked against the registry at registration, so an unknown or
//! mis-tiered handler fails startup instead of a request.

use futures::future::BoxFuture;
use sdk::{AgentHandler, HandlerRequest, MemoryUpdate, OrchestrationError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::generic::GenericHandler;
use crate::db::{MemoryRepository, ScopedUpdate};
use crate::managers::{CapabilityRouter, Manager, ManagerHandler};
use crate::message_bus::MessageBus;
use crate::registry::{AgentDescriptor, Registry};

/// What a successful invocation produced
#[derive(Debug, Clone)]
pub struct Outcome {
    pub result: serde_json::Value,
    /// Memory writes to apply if the task completes
    pub updates: Vec<ScopedUpdate>,
}

/// Handlers keyed by agent id
#[derive(Default)]
pub struct HandlerRegistry {
    specialists: HashMap<String, Arc<dyn AgentHandler>>,
    managers: HashMap<String, Arc<dyn ManagerHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a non-manager agent
    pub fn register(
        &mut self,
        registry: &Registry,
        handler: Arc<dyn AgentHandler>,
    ) -> Result<(), OrchestrationError> {
        let id = handler.agent_id().to_string();
        let descriptor = registry.get(&id).ok_or_else(|| {
            OrchestrationError::Config(format!("handler registered for unknown agent '{}'", id))
        })?;
        if descriptor.is_manager() {
            return Err(OrchestrationError::Config(format!(
                "'{}' is a manager and needs a ManagerHandler",
                id
            )));
        }
        self.specialists.insert(id, handler);
        Ok(())
    }

    /// Register a handler for a manager-tier agent
    pub fn register_manager(
        &mut self,
        registry: &Registry,
        handler: Arc<dyn ManagerHandler>,
    ) -> Result<(), OrchestrationError> {
        let id = handler.agent_id().to_string();
        let descriptor = registry.get(&id).ok_or_else(|| {
            OrchestrationError::Config(format!("handler registered for unknown agent '{}'", id))
        })?;
        if !descriptor.is_manager() {
            return Err(OrchestrationError::Config(format!("'{}' is not a manager", id)));
        }
        self.managers.insert(id, handler);
        Ok(())
    }

    pub fn has_handler(&self, agent_id: &str) -> bool {
        self.specialists.contains_key(agent_id) || self.managers.contains_key(agent_id)
    }
}

/// Runs the handler resolved for an agent
pub struct AgentInvoker {
    registry: Arc<Registry>,
    handlers: HandlerRegistry,
    generic: GenericHandler,
    memory: MemoryRepository,
    bus: MessageBus,
}

impl AgentInvoker {
    pub fn new(
        registry: Arc<Registry>,
        handlers: HandlerRegistry,
        generic: GenericHandler,
        memory: MemoryRepository,
        bus: MessageBus,
    ) -> Self {
        Self {
            registry,
            handlers,
            generic,
            memory,
            bus,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn generic(&self) -> &GenericHandler {
        &self.generic
    }

    pub fn memory(&self) -> &MemoryRepository {
        &self.memory
    }

    /// Run the registered specialist's admission checks, if it has any
    pub fn validate(
        &self,
        descriptor: &AgentDescriptor,
        intent: &str,
        params: &serde_json::Value,
    ) -> Result<(), OrchestrationError> {
        if descriptor.is_manager() {
            return Ok(());
        }
        match self.handlers.specialists.get(&descriptor.id) {
            Some(handler) => handler.validate(intent, params),
            None => Ok(()),
        }
    }

    /// Invoke the handler for `descriptor`
    ///
    /// Boxed because managers re-enter it for their subordinates.
    pub fn invoke(
        self: &Arc<Self>,
        descriptor: Arc<AgentDescriptor>,
        request: HandlerRequest,
    ) -> BoxFuture<'static, Result<Outcome, OrchestrationError>> {
        let this = Arc::clone(self);
        Box::pin(async move {
            if descriptor.is_manager() {
                this.invoke_manager(descriptor, request).await
            } else {
                this.invoke_specialist(descriptor, request).await
            }
        })
    }

    async fn invoke_specialist(
        &self,
        descriptor: Arc<AgentDescriptor>,
        request: HandlerRequest,
    ) -> Result<Outcome, OrchestrationError> {
        let requester_id = request.requester_id.clone();

        let output = match self.handlers.specialists.get(&descriptor.id) {
            Some(handler) => {
                debug!(agent = %descriptor.id, "Invoking specialist handler");
                let memory = self.memory.scoped(&descriptor.id, &requester_id);
                handler.handle(request, &memory).await?
            }
            None => {
                debug!(agent = %descriptor.id, "No handler registered, using generic handler");
                self.generic.handle(&descriptor, &request).await?
            }
        };

        Ok(Outcome {
            result: output.result,
            updates: scope(&descriptor.id, &requester_id, output.memory_updates),
        })
    }

    async fn invoke_manager(
        self: Arc<Self>,
        descriptor: Arc<AgentDescriptor>,
        request: HandlerRequest,
    ) -> Result<Outcome, OrchestrationError> {
        let handler: Arc<dyn ManagerHandler> = match self.handlers.managers.get(&descriptor.id) {
            Some(handler) => Arc::clone(handler),
            None => Arc::new(CapabilityRouter::new(descriptor.id.clone())),
        };

        let manager = Manager::new(
            Arc::clone(&descriptor),
            Arc::clone(&self),
            self.bus.clone(),
            request.task_id.clone(),
        );
        let requester_id = request.requester_id.clone();
        let intent = request.intent.clone();

        match handler.handle(&manager, request).await {
            Ok(output) => {
                let mut updates = manager.take_updates();
                updates.extend(scope(&descriptor.id, &requester_id, output.memory_updates));
                Ok(Outcome {
                    result: output.result,
                    updates,
                })
            }
            Err(e) => {
                manager.escalate_failure(&requester_id, &intent, &e).await;
                Err(e)
            }
        }
    }
}

fn scope(agent_id: &str, requester_id: &str, updates: Vec<MemoryUpdate>) -> Vec<ScopedUpdate> {
    updates
        .into_iter()
        .map(|update| ScopedUpdate::new(agent_id, requester_id, update))
        .collect()
}
