// Concierge agent orchestration engine
// Main entry point for the concierge binary

use clap::Parser;
use concierge_engine::cli::{Cli, Command};
use concierge_engine::config::Config;
use concierge_engine::handlers::{
    handle_agents, handle_cancel, handle_doctor, handle_escalations, handle_history,
    handle_status, handle_submit, handle_sweep, OutputFormat,
};
use concierge_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the configured level; RUST_LOG wins over both
    init_telemetry_with_level(cli.log.as_deref().unwrap_or(&config.core.log_level));

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::debug!("Concierge v{} ({} - {})", version, commit, timestamp);

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Handle commands
    match cli.command {
        Command::Agents { tier } => handle_agents(tier, &config, format).await,
        Command::Submit {
            agent,
            intent,
            params,
            token,
        } => {
            tracing::info!("Submitting '{}' to {}", intent, agent);
            handle_submit(agent, intent, params, token, &config, format).await
        }
        Command::Status { task_id } => handle_status(task_id, &config, format).await,
        Command::History { limit } => {
            tracing::info!("Showing last {} tasks", limit);
            handle_history(limit, &config, format).await
        }
        Command::Cancel { task_id } => {
            tracing::info!("Cancelling task: {}", task_id);
            handle_cancel(task_id, &config, format).await
        }
        Command::Escalations { limit } => handle_escalations(limit, &config, format).await,
        Command::Sweep { tasks_older_than } => {
            tracing::info!("Sweeping expired memory");
            handle_sweep(tasks_older_than, &config, format).await
        }
        Command::Doctor => {
            tracing::info!("Running diagnostics...");
            handle_doctor(&config, format).await
        }
    }
}
