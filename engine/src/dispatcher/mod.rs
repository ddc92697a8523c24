//! Dispatcher
//!
//! Single entry point for task submission. A submission goes through:
//!
//! 1. caller resolution (bearer credential → requester id + tier)
//! 2. admission: registry lookup, access tier, capability parameters
//! 3. ledger: the task is created and moved to `running`
//! 4. invocation of the resolved handler under the handler timeout
//! 5. completion: result and memory updates are committed together, or the
//!    task is marked failed and nothing is written
//!
//! Admission failures return before any ledger row exists. `submit` never
//! returns `Err`; every outcome is a [`TaskResult`].

use sdk::{AgentHandler, ConciergeErrorExt, HandlerRequest, OrchestrationError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::auth::{CallerAuth, CredentialResolver, StaticCredentials};
use crate::db::{Database, MemoryRepository, Task, TaskRepository, TaskStatus};
use crate::llm::CompletionService;
use crate::managers::{escalation, ManagerHandler};
use crate::message_bus::{Event, MessageBus};
use crate::registry::{AgentDescriptor, Registry};

pub mod generic;
pub mod invoker;
pub mod prompts;

use generic::GenericHandler;
use invoker::{AgentInvoker, HandlerRegistry};

const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Structured outcome of one submission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub success: bool,
    /// `None` when the submission was rejected before a task was created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Agents the caller may use; filled on `access_denied`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_agents: Vec<String>,
}

impl TaskResult {
    fn completed(task_id: &str, agent_id: &str, result: serde_json::Value) -> Self {
        Self {
            success: true,
            task_id: Some(task_id.to_string()),
            agent_id: agent_id.to_string(),
            status: Some(TaskStatus::Completed),
            result: Some(result),
            error: None,
            error_code: None,
            available_agents: Vec::new(),
        }
    }

    fn rejected(agent_id: &str, error: &OrchestrationError) -> Self {
        Self {
            success: false,
            task_id: None,
            agent_id: agent_id.to_string(),
            status: None,
            result: None,
            error: Some(error.to_string()),
            error_code: Some(error.code().to_string()),
            available_agents: Vec::new(),
        }
    }

    fn ended(task_id: &str, agent_id: &str, status: TaskStatus, error: &OrchestrationError) -> Self {
        Self {
            task_id: Some(task_id.to_string()),
            status: Some(status),
            ..Self::rejected(agent_id, error)
        }
    }

    fn cancelled(task_id: &str, agent_id: &str) -> Self {
        Self {
            success: false,
            task_id: Some(task_id.to_string()),
            agent_id: agent_id.to_string(),
            status: Some(TaskStatus::Cancelled),
            result: None,
            error: Some("Task was cancelled".to_string()),
            error_code: Some("task_cancelled".to_string()),
            available_agents: Vec::new(),
        }
    }

    fn with_available(mut self, agents: Vec<String>) -> Self {
        self.available_agents = agents;
        self
    }
}

/// Builder wiring handlers and collaborators into a `Dispatcher`
pub struct DispatcherBuilder {
    registry: Arc<Registry>,
    tasks: TaskRepository,
    memory: MemoryRepository,
    completion: Arc<dyn CompletionService>,
    bus: MessageBus,
    credentials: Arc<dyn CredentialResolver>,
    specialists: Vec<Arc<dyn AgentHandler>>,
    managers: Vec<Arc<dyn ManagerHandler>>,
    handler_timeout: Duration,
    completion_timeout: Duration,
    max_tokens: u32,
}

impl DispatcherBuilder {
    pub fn bus(mut self, bus: MessageBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn credentials(mut self, credentials: Arc<dyn CredentialResolver>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn handler(mut self, handler: Arc<dyn AgentHandler>) -> Self {
        self.specialists.push(handler);
        self
    }

    pub fn manager_handler(mut self, handler: Arc<dyn ManagerHandler>) -> Self {
        self.managers.push(handler);
        self
    }

    /// Bound on a whole handler invocation, delegations included
    pub fn handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Bound and token ceiling for generic-handler completion calls
    pub fn completion_limits(mut self, timeout: Duration, max_tokens: u32) -> Self {
        self.completion_timeout = timeout;
        self.max_tokens = max_tokens;
        self
    }

    /// Fails when a handler names an unknown agent or the wrong tier
    pub fn build(self) -> Result<Dispatcher, OrchestrationError> {
        let mut handlers = HandlerRegistry::new();
        for handler in self.specialists {
            handlers.register(&self.registry, handler)?;
        }
        for handler in self.managers {
            handlers.register_manager(&self.registry, handler)?;
        }

        let generic = GenericHandler::new(self.completion, self.max_tokens, self.completion_timeout);
        let invoker = AgentInvoker::new(
            Arc::clone(&self.registry),
            handlers,
            generic,
            self.memory,
            self.bus.clone(),
        );

        Ok(Dispatcher {
            registry: self.registry,
            tasks: self.tasks,
            invoker: Arc::new(invoker),
            credentials: self.credentials,
            bus: self.bus,
            handler_timeout: self.handler_timeout,
        })
    }
}

/// Routes intents to agents and tracks them in the task ledger
pub struct Dispatcher {
    registry: Arc<Registry>,
    tasks: TaskRepository,
    invoker: Arc<AgentInvoker>,
    credentials: Arc<dyn CredentialResolver>,
    bus: MessageBus,
    handler_timeout: Duration,
}

impl Dispatcher {
    pub fn builder(
        registry: Arc<Registry>,
        db: &Database,
        completion: Arc<dyn CompletionService>,
    ) -> DispatcherBuilder {
        DispatcherBuilder {
            registry,
            tasks: db.tasks(),
            memory: db.memory(),
            completion,
            bus: MessageBus::new(),
            credentials: Arc::new(StaticCredentials::default()),
            specialists: Vec::new(),
            managers: Vec::new(),
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            completion_timeout: DEFAULT_COMPLETION_TIMEOUT,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Submit an intent to an agent
    pub async fn submit(
        &self,
        agent_id: &str,
        intent: &str,
        params: serde_json::Value,
        auth: &CallerAuth,
    ) -> TaskResult {
        let caller = self.credentials.resolve(auth).await;

        let Some(descriptor) = self.registry.get(agent_id) else {
            warn!(agent = %agent_id, "Rejected submission for unknown agent");
            return TaskResult::rejected(agent_id, &OrchestrationError::UnknownAgent(agent_id.to_string()));
        };

        if !caller.tier.satisfies(descriptor.access_tier) {
            let error = OrchestrationError::AccessDenied {
                agent_id: agent_id.to_string(),
                required: descriptor.access_tier,
                actual: caller.tier,
            };
            info!(agent = %agent_id, tier = %caller.tier, "Access denied");
            return TaskResult::rejected(agent_id, &error)
                .with_available(self.registry.accessible_to(caller.tier));
        }

        if let Some(capability) = descriptor.capability(intent) {
            let missing = capability.missing_params(&params);
            if !missing.is_empty() {
                let error = OrchestrationError::Validation(format!(
                    "'{}' requires parameters: {}",
                    intent,
                    missing.join(", ")
                ));
                return TaskResult::rejected(agent_id, &error);
            }
        }

        if let Err(error) = self.invoker.validate(&descriptor, intent, &params) {
            info!(agent = %agent_id, "Rejected submission: {}", error);
            return TaskResult::rejected(agent_id, &error);
        }

        let task_id = uuid::Uuid::new_v4().to_string();
        if let Err(e) = self
            .tasks
            .create_task(&task_id, &caller.requester_id, agent_id, intent, &params)
            .await
        {
            error!("Failed to record task: {:#}", e);
            return TaskResult::rejected(agent_id, &OrchestrationError::Database(e.to_string()));
        }

        match self.tasks.start_task(&task_id).await {
            Ok(true) => {}
            // cancelled between insert and start
            Ok(false) => return TaskResult::cancelled(&task_id, agent_id),
            Err(e) => {
                let error = OrchestrationError::Database(e.to_string());
                return self.fail(&task_id, &descriptor, error).await;
            }
        }

        self.bus
            .publish(Event::TaskStarted {
                task_id: task_id.clone(),
                agent_id: agent_id.to_string(),
                requester_id: caller.requester_id.clone(),
            })
            .await;

        info!(task_id = %task_id, agent = %agent_id, requester = %caller.requester_id, "Task started");

        let request = HandlerRequest {
            task_id: task_id.clone(),
            agent_id: agent_id.to_string(),
            requester_id: caller.requester_id.clone(),
            intent: intent.to_string(),
            params,
        };

        let invocation = self.invoker.invoke(Arc::clone(&descriptor), request);
        let outcome = match tokio::time::timeout(self.handler_timeout, invocation).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => return self.fail(&task_id, &descriptor, e).await,
            Err(_) => {
                let error = OrchestrationError::Timeout(format!(
                    "{} did not finish within {}s",
                    agent_id,
                    self.handler_timeout.as_secs()
                ));
                if descriptor.is_manager() {
                    escalation::escalate(
                        &self.bus,
                        &descriptor,
                        &caller.requester_id,
                        &error.to_string(),
                        serde_json::json!({ "taskId": task_id, "intent": intent, "code": error.code() }),
                        descriptor.criticality,
                    )
                    .await;
                }
                return self.fail(&task_id, &descriptor, error).await;
            }
        };

        match self
            .tasks
            .complete_with_memory(&task_id, &outcome.result, &outcome.updates)
            .await
        {
            Ok(true) => {
                info!(task_id = %task_id, agent = %agent_id, "Task completed");
                self.bus
                    .publish(Event::TaskCompleted {
                        task_id: task_id.clone(),
                        agent_id: agent_id.to_string(),
                    })
                    .await;
                TaskResult::completed(&task_id, agent_id, outcome.result)
            }
            Ok(false) => {
                info!(task_id = %task_id, "Task was cancelled while running, result discarded");
                TaskResult::cancelled(&task_id, agent_id)
            }
            Err(e) => {
                error!(task_id = %task_id, "Failed to commit task result: {:#}", e);
                self.fail(&task_id, &descriptor, OrchestrationError::Database(e.to_string()))
                    .await
            }
        }
    }

    async fn fail(
        &self,
        task_id: &str,
        descriptor: &AgentDescriptor,
        error: OrchestrationError,
    ) -> TaskResult {
        warn!(task_id = %task_id, agent = %descriptor.id, "Task failed: {}", error);

        let status = match self.tasks.fail_task(task_id, &error.to_string()).await {
            Ok(true) => TaskStatus::Failed,
            Ok(false) => TaskStatus::Cancelled,
            Err(e) => {
                error!(task_id = %task_id, "Failed to record task failure: {:#}", e);
                TaskStatus::Failed
            }
        };

        if status == TaskStatus::Failed {
            self.bus
                .publish(Event::TaskFailed {
                    task_id: task_id.to_string(),
                    agent_id: descriptor.id.clone(),
                    error: error.to_string(),
                })
                .await;
        }

        if status == TaskStatus::Cancelled {
            return TaskResult::cancelled(task_id, &descriptor.id);
        }
        TaskResult::ended(task_id, &descriptor.id, status, &error)
    }

    /// Cancel a pending or running task
    ///
    /// Returns `false` when the task already reached a terminal state.
    /// Handlers still in flight are not interrupted; their result is
    /// discarded when they return.
    pub async fn cancel(&self, task_id: &str) -> Result<bool, OrchestrationError> {
        let cancelled = self
            .tasks
            .cancel_task(task_id)
            .await
            .map_err(|e| OrchestrationError::Database(e.to_string()))?;

        if cancelled {
            info!(task_id = %task_id, "Task cancelled");
            self.bus
                .publish(Event::TaskCancelled {
                    task_id: task_id.to_string(),
                })
                .await;
            return Ok(true);
        }

        match self.task(task_id).await? {
            Some(_) => Ok(false),
            None => Err(OrchestrationError::TaskNotFound(task_id.to_string())),
        }
    }

    pub async fn task(&self, task_id: &str) -> Result<Option<Task>, OrchestrationError> {
        self.tasks
            .get_task(task_id)
            .await
            .map_err(|e| OrchestrationError::Database(e.to_string()))
    }

    /// Agents the holder of `auth` may submit to, in catalog order
    pub async fn accessible_agents(&self, auth: &CallerAuth) -> Vec<Arc<AgentDescriptor>> {
        let caller = self.credentials.resolve(auth).await;
        self.registry
            .all()
            .iter()
            .filter(|agent| caller.tier.satisfies(agent.access_tier))
            .cloned()
            .collect()
    }
}
