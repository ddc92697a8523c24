//! Concierge SDK
//!
//! Shared library providing the error taxonomy, value types, and handler
//! traits used by the orchestration engine and by specialist agent handlers.

/// Error types and handling
pub mod errors;

/// Handler and memory-view traits
pub mod handler;

/// Shared value types
pub mod types;

// Re-export commonly used types
pub use errors::{ConciergeErrorExt, OrchestrationError};
pub use handler::{AgentHandler, EmptyMemory, MemoryView};
pub use types::{AccessTier, HandlerOutput, HandlerRequest, MemoryUpdate, Severity};
