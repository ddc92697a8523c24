//! Error types and handling
//!
//! This module provides the error taxonomy used throughout the Concierge
//! orchestration engine. All errors implement the `ConciergeErrorExt` trait
//! which provides user-friendly hints, a stable machine-readable code, and
//! whether the error is recoverable.
//!
//! # Propagation
//!
//! - `UnknownAgent`, `AccessDenied` and `Validation` are raised before any task
//!   is recorded.
//! - `HandlerFailure` and `Timeout` end up in a task's `error` field and, for
//!   manager-tier agents, trigger escalation.
//! - `Parse` is recovered locally by the reasoning engine and never reaches a
//!   caller.
//!
//! # Examples
//!
//! ```
//! use sdk::errors::{ConciergeErrorExt, OrchestrationError};
//!
//! let error = OrchestrationError::UnknownAgent("ghost".to_string());
//! assert_eq!(error.code(), "unknown_agent");
//! assert!(!error.is_recoverable());
//!
//! let timeout = OrchestrationError::Timeout("completion".to_string());
//! assert!(timeout.is_recoverable());
//! ```

use crate::types::AccessTier;
use thiserror::Error;

/// Trait for Concierge error extensions
///
/// The hint is safe to display to end users and never contains credentials
/// or internal identifiers beyond the agent ids the caller already supplied.
pub trait ConciergeErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether retrying the same request may succeed
    fn is_recoverable(&self) -> bool;

    /// Stable snake_case identifier for structured results
    fn code(&self) -> &'static str;
}

/// Main orchestration error type
#[derive(Debug, Error)]
pub enum OrchestrationError {
    // Admission errors (raised before a task exists)
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Access denied to agent {agent_id}: requires {required} tier, caller is {actual}")]
    AccessDenied {
        agent_id: String,
        required: AccessTier,
        actual: AccessTier,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    // Delegation errors
    #[error("Agent {subordinate} is not supervised by {manager}")]
    NotSupervised {
        manager: String,
        subordinate: String,
    },

    // Execution errors
    #[error("Handler failure: {0}")]
    HandlerFailure(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Completion service error: {0}")]
    Completion(String),

    // Ledger and memory errors
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Memory version conflict for key {key}: expected {expected}, found {found}")]
    VersionConflict {
        key: String,
        expected: i64,
        found: i64,
    },

    #[error("Database error: {0}")]
    Database(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConciergeErrorExt for OrchestrationError {
    fn user_hint(&self) -> &str {
        match self {
            Self::UnknownAgent(_) => "The requested agent does not exist",
            Self::AccessDenied { .. } => "Your account tier cannot use this agent",
            Self::Validation(_) => "The request is missing required parameters",
            Self::NotSupervised { .. } => "This agent cannot hand work to that agent",
            Self::HandlerFailure(_) => "The agent could not complete the request",
            Self::Timeout(_) => "The agent took too long to respond. Try again",
            Self::Parse(_) => "The agent produced an unreadable response",
            Self::Completion(_) => "The language model service is unavailable",
            Self::TaskNotFound(_) => "No task exists with that id",
            Self::VersionConflict { .. } => "The stored value changed. Reload and retry",
            Self::Database(_) => "Storage operation failed. Try again later",
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::UnknownAgent(_)
            | Self::AccessDenied { .. }
            | Self::Validation(_)
            | Self::NotSupervised { .. }
            | Self::TaskNotFound(_)
            | Self::Config(_) => false,

            _ => true,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::UnknownAgent(_) => "unknown_agent",
            Self::AccessDenied { .. } => "access_denied",
            Self::Validation(_) => "validation_error",
            Self::NotSupervised { .. } => "not_supervised",
            Self::HandlerFailure(_) => "handler_failure",
            Self::Timeout(_) => "timeout_error",
            Self::Parse(_) => "parse_error",
            Self::Completion(_) => "completion_error",
            Self::TaskNotFound(_) => "task_not_found",
            Self::VersionConflict { .. } => "version_conflict",
            Self::Database(_) => "database_error",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
        }
    }
}
