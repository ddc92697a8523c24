//! CLI interface for Concierge
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags for operating the orchestration
//! engine.

use clap::{Parser, Subcommand};
use sdk::AccessTier;
use std::path::PathBuf;

/// Concierge agent orchestration engine
///
/// Routes intents to a hierarchy of specialist and manager agents, tracks
/// every task in a local ledger, and talks to local or hosted LLM providers.
#[derive(Parser, Debug)]
#[command(name = "concierge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List agents in the catalog
    Agents {
        /// Only show agents usable at this tier (guest, premium, admin)
        #[arg(long, value_name = "TIER")]
        tier: Option<AccessTier>,
    },

    /// Submit an intent to an agent and wait for the result
    Submit {
        /// Target agent id
        agent: String,

        /// Intent, usually a capability name
        intent: String,

        /// Parameters as a JSON object
        #[arg(short, long, value_name = "JSON")]
        params: Option<String>,

        /// Bearer credential; omitted means anonymous guest
        #[arg(short, long)]
        token: Option<String>,
    },

    /// Show one task
    Status {
        /// Task ID
        task_id: String,
    },

    /// Show task history
    History {
        /// Number of tasks to show (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Cancel a pending or running task
    Cancel {
        /// Task ID
        task_id: String,
    },

    /// Show recent escalations
    Escalations {
        /// Number of escalations to show (default: 20)
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Delete expired memory entries now
    Sweep {
        /// Also delete finished tasks older than this many days
        #[arg(long, value_name = "DAYS")]
        tasks_older_than: Option<u64>,
    },

    /// Run system diagnostics
    Doctor,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_submit() {
        let cli = Cli::try_parse_from([
            "concierge",
            "--json",
            "submit",
            "trip-planner",
            "plan_trip",
            "--params",
            r#"{"destination":"Lisbon"}"#,
        ])
        .unwrap();

        assert!(cli.json);
        match cli.command {
            Command::Submit {
                agent,
                intent,
                params,
                token,
            } => {
                assert_eq!(agent, "trip-planner");
                assert_eq!(intent, "plan_trip");
                assert!(params.unwrap().contains("Lisbon"));
                assert!(token.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_agents_tier() {
        let cli = Cli::try_parse_from(["concierge", "agents", "--tier", "premium"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Agents {
                tier: Some(AccessTier::Premium)
            }
        ));
    }
}
