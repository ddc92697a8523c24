//! Concierge Engine Library
//!
//! This library provides the core functionality of the Concierge
//! orchestration engine. It is used by both the main binary and integration
//! tests.

/// Configuration management module
pub mod config;

/// Telemetry and Observability
pub mod telemetry;

/// Database persistence module
pub mod db;

/// Message bus for fire-and-forget side effects
pub mod message_bus;

/// Completion service abstraction layer
pub mod llm;

/// Agent catalog
pub mod registry;

/// Caller credential resolution
pub mod auth;

/// Task submission entry point
pub mod dispatcher;

/// Manager delegation, coordination and escalation
pub mod managers;

/// Chained-reasoning engine
pub mod reasoning;

/// Parallel execution coordinator
pub mod parallel;

/// Bespoke specialist handlers
pub mod specialists;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
