//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - agents: List the catalog, optionally filtered by tier
//! - submit: Run one intent through the dispatcher
//! - status / history / cancel: Inspect and manage the task ledger
//! - escalations: Show recent escalation records
//! - sweep: Purge expired memory and old tasks
//! - doctor: Validate configuration and check providers

use anyhow::{Context, Result};
use sdk::AccessTier;
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::auth::{CallerAuth, StaticCredentials};
use crate::config::Config;
use crate::db::{AuditWriter, Database, Task};
use crate::dispatcher::{Dispatcher, TaskResult};
use crate::llm::router::CompletionRouter;
use crate::llm::CompletionService;
use crate::message_bus::MessageBus;
use crate::registry::{AgentDescriptor, Registry};
use crate::specialists;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Load the configured catalog, or the built-in one
pub fn load_registry(config: &Config) -> Result<Registry> {
    let registry = match &config.orchestrator.catalog {
        Some(path) => Registry::load(path)
            .with_context(|| format!("Failed to load agent catalog {}", path.display()))?,
        None => Registry::builtin().context("Built-in agent catalog is invalid")?,
    };
    Ok(registry)
}

async fn open_database(config: &Config) -> Result<Database> {
    Database::new(&config.database_path())
        .await
        .context("Failed to open database")
}

/// A dispatcher with its audit writer attached
///
/// `shutdown` drops the dispatcher so the bus closes, then waits for the
/// writer to drain what was already published.
pub struct Engine {
    pub dispatcher: Dispatcher,
    pub database: Database,
    audit: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

impl Engine {
    pub async fn start(config: &Config) -> Result<Self> {
        let database = open_database(config).await?;
        let registry = Arc::new(load_registry(config)?);
        let completion: Arc<dyn CompletionService> =
            Arc::new(CompletionRouter::from_config(&config.llm));

        let bus = MessageBus::new();
        let audit = AuditWriter::spawn(database.audit(), &bus).await;
        let sweeper = database
            .memory()
            .spawn_sweeper(config.memory_sweep_interval());

        let builder = Dispatcher::builder(Arc::clone(&registry), &database, Arc::clone(&completion))
            .bus(bus)
            .credentials(Arc::new(StaticCredentials::new(&config.auth.tokens)))
            .handler_timeout(config.handler_timeout())
            .completion_limits(
                std::time::Duration::from_secs(config.llm.timeout_secs),
                config.llm.max_tokens,
            );
        let dispatcher = specialists::register_defaults(builder, &registry, completion, config)
            .build()
            .context("Failed to register agent handlers")?;

        Ok(Self {
            dispatcher,
            database,
            audit,
            sweeper,
        })
    }

    pub async fn shutdown(self) -> Result<()> {
        self.sweeper.abort();
        drop(self.dispatcher);
        self.audit.await.ok();
        self.database.close().await
    }
}

fn format_millis(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

fn print_task(task: &Task) {
    println!("Task ID: {}", task.id);
    println!("  Agent: {}", task.agent_id);
    println!("  Intent: {}", task.intent);
    println!("  Requester: {}", task.requester_id);
    println!("  Status: {} ({}%)", task.status, task.progress);
    if let Some(error) = &task.error {
        println!("  Error: {}", error);
    }
    println!("  Created: {}", format_millis(task.created_at));
    println!("  Updated: {}", format_millis(task.updated_at));
}

/// List agents in the catalog
pub async fn handle_agents(
    tier: Option<AccessTier>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let registry = load_registry(config)?;
    let agents: Vec<&AgentDescriptor> = registry
        .all()
        .iter()
        .map(|agent| agent.as_ref())
        .filter(|agent| tier.map_or(true, |t| t.satisfies(agent.access_tier)))
        .collect();

    match format {
        OutputFormat::Text => {
            println!("Agents ({}):", agents.len());
            println!();
            for agent in &agents {
                let role = match agent.supervision_tier {
                    Some(t) if agent.is_manager() => format!("manager, tier {}", t),
                    Some(t) => format!("tier {}", t),
                    None => "specialist".to_string(),
                };
                println!(
                    "  {:<28} {:<10} {:<18} {}",
                    agent.id, agent.access_tier, role, agent.display_name
                );
                for capability in &agent.capabilities {
                    println!("      - {}", capability.name);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({ "agents": agents, "count": agents.len() });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Submit an intent and print the task result
pub async fn handle_submit(
    agent: String,
    intent: String,
    params: Option<String>,
    token: Option<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let params: serde_json::Value = match params {
        Some(raw) => serde_json::from_str(&raw).context("--params must be valid JSON")?,
        None => json!({}),
    };
    let auth = token.map(CallerAuth::bearer).unwrap_or_default();

    let engine = Engine::start(config).await?;
    let result = engine.dispatcher.submit(&agent, &intent, params, &auth).await;
    engine.shutdown().await?;

    print_task_result(&result, format)
}

fn print_task_result(result: &TaskResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            if let Some(task_id) = &result.task_id {
                println!("Task ID: {}", task_id);
            }
            if result.success {
                let body = result.result.clone().unwrap_or_default();
                match body.get("response").and_then(|v| v.as_str()) {
                    Some(text) => println!("{}", text),
                    None => println!("{}", serde_json::to_string_pretty(&body)?),
                }
            } else {
                println!(
                    "Failed [{}]: {}",
                    result.error_code.as_deref().unwrap_or("error"),
                    result.error.as_deref().unwrap_or("unknown error")
                );
                if !result.available_agents.is_empty() {
                    println!("Agents available to you: {}", result.available_agents.join(", "));
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?);
        }
    }
    Ok(())
}

/// Show one task
pub async fn handle_status(task_id: String, config: &Config, format: OutputFormat) -> Result<()> {
    let database = open_database(config).await?;
    let task = database
        .tasks()
        .get_task(&task_id)
        .await
        .context("Failed to fetch task")?
        .ok_or_else(|| anyhow::anyhow!("Task not found: {}", task_id))?;

    match format {
        OutputFormat::Text => {
            print_task(&task);
            if let Some(result) = &task.result {
                println!("  Result: {}", serde_json::to_string_pretty(result)?);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&task)?),
    }

    Ok(())
}

/// Show task history
pub async fn handle_history(limit: usize, config: &Config, format: OutputFormat) -> Result<()> {
    let database = open_database(config).await?;
    let tasks = database
        .tasks()
        .get_recent_tasks(limit as i64)
        .await
        .context("Failed to fetch task history")?;

    match format {
        OutputFormat::Text => {
            if tasks.is_empty() {
                println!("No tasks in history");
                return Ok(());
            }

            println!("Task History (last {} tasks):", limit);
            println!();
            for task in &tasks {
                print_task(task);
                println!();
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "tasks": tasks,
                "count": tasks.len(),
                "limit": limit
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Cancel a task
pub async fn handle_cancel(task_id: String, config: &Config, format: OutputFormat) -> Result<()> {
    let engine = Engine::start(config).await?;
    let outcome = engine.dispatcher.cancel(&task_id).await;
    engine.shutdown().await?;
    let cancelled = outcome?;

    match format {
        OutputFormat::Text => {
            if cancelled {
                println!("Task {} cancelled", task_id);
            } else {
                println!("Task {} already finished", task_id);
            }
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "taskId": task_id, "cancelled": cancelled }))?
            );
        }
    }

    Ok(())
}

/// Show recent escalations
pub async fn handle_escalations(limit: usize, config: &Config, format: OutputFormat) -> Result<()> {
    let database = open_database(config).await?;
    let escalations = database
        .audit()
        .recent_escalations(limit as i64)
        .await
        .context("Failed to fetch escalations")?;

    match format {
        OutputFormat::Text => {
            if escalations.is_empty() {
                println!("No escalations");
                return Ok(());
            }
            for record in &escalations {
                let target = record
                    .to_supervisor_id
                    .as_deref()
                    .unwrap_or("OPERATOR");
                println!(
                    "[{}] {} {} -> {}",
                    format_millis(record.created_at),
                    record.severity,
                    record.from_agent_id,
                    target
                );
                println!("  {}", record.message);
            }
        }
        OutputFormat::Json => {
            let output = json!({ "escalations": escalations, "count": escalations.len() });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Purge expired memory and, optionally, old finished tasks
pub async fn handle_sweep(
    tasks_older_than: Option<u64>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let database = open_database(config).await?;
    let memory_entries = database
        .memory()
        .sweep_expired()
        .await
        .context("Failed to sweep memory")?;

    let tasks = match tasks_older_than {
        Some(days) => {
            let cutoff = chrono::Utc::now() - chrono::Duration::days(days as i64);
            database
                .tasks()
                .delete_old_tasks(cutoff.timestamp_millis())
                .await
                .context("Failed to delete old tasks")?
        }
        None => 0,
    };

    match format {
        OutputFormat::Text => {
            println!("Removed {} expired memory entries", memory_entries);
            if tasks_older_than.is_some() {
                println!("Removed {} finished tasks", tasks);
            }
        }
        OutputFormat::Json => {
            let output = json!({ "memoryEntries": memory_entries, "tasks": tasks });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Validate configuration, catalog, database and providers
pub async fn handle_doctor(config: &Config, format: OutputFormat) -> Result<()> {
    let mut issues = Vec::new();
    let mut checks: Vec<(String, String)> = Vec::new();

    // Config is already validated when loaded
    checks.push(("Configuration".into(), "Valid".into()));

    match load_registry(config) {
        Ok(registry) => {
            checks.push(("Agent catalog".into(), format!("{} agents", registry.len())));
        }
        Err(e) => {
            checks.push(("Agent catalog".into(), "Invalid".into()));
            issues.push(format!("{:#}", e));
        }
    }

    if config.core.data_dir.exists() {
        checks.push(("Data directory".into(), "Exists".into()));
    } else {
        checks.push(("Data directory".into(), "Missing".into()));
        issues.push(format!("Data directory does not exist: {:?}", config.core.data_dir));
    }

    match open_database(config).await {
        Ok(database) => {
            checks.push(("Database connection".into(), "OK".into()));
            database.close().await.ok();
        }
        Err(e) => {
            checks.push(("Database connection".into(), "Failed".into()));
            issues.push(format!("Cannot open database: {:#}", e));
        }
    }

    let router = CompletionRouter::from_config(&config.llm);
    let health = router.check_health_all().await;
    for (name, healthy) in &health {
        let status = if *healthy { "Available" } else { "Not available" };
        checks.push((format!("Provider {}", name), status.into()));
    }
    if !health.iter().any(|(_, healthy)| *healthy) {
        issues.push("No LLM providers available. Start Ollama or set an API key.".to_string());
    }

    if config.auth.tokens.is_empty() {
        checks.push(("Auth tokens".into(), "None (all callers are guests)".into()));
    } else {
        checks.push(("Auth tokens".into(), format!("{} configured", config.auth.tokens.len())));
    }

    match format {
        OutputFormat::Text => {
            println!("Concierge System Diagnostics");
            println!("============================");
            println!();

            println!("System Checks:");
            for (check, status) in &checks {
                println!("  {:<25} {}", format!("{}:", check), status);
            }

            println!();

            if issues.is_empty() {
                println!("✓ All checks passed!");
            } else {
                println!("⚠ Issues found:");
                println!();
                for (i, issue) in issues.iter().enumerate() {
                    println!("  {}. {}", i + 1, issue);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "checks": checks.iter().map(|(name, status)| {
                    json!({
                        "name": name,
                        "status": status
                    })
                }).collect::<Vec<_>>(),
                "issues": issues,
                "healthy": issues.is_empty()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
