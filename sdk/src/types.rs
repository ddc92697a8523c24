//! Shared value types exchanged between the engine and agent handlers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coarse caller tier, ordered from least to most privileged
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessTier {
    Guest,
    Premium,
    Admin,
}

impl AccessTier {
    pub fn as_str(&self) -> &str {
        match self {
            AccessTier::Guest => "guest",
            AccessTier::Premium => "premium",
            AccessTier::Admin => "admin",
        }
    }

    /// Whether a caller holding `self` may use an agent requiring `required`
    pub fn satisfies(&self, required: AccessTier) -> bool {
        *self >= required
    }
}

impl fmt::Display for AccessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "guest" => Ok(AccessTier::Guest),
            "premium" => Ok(AccessTier::Premium),
            "admin" => Ok(AccessTier::Admin),
            other => Err(format!("unknown access tier '{}'", other)),
        }
    }
}

/// Escalation severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Medium
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// A memory write a handler asks the engine to apply once its task succeeds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryUpdate {
    pub key: String,
    pub data: serde_json::Value,
    /// Expiry as unix epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl MemoryUpdate {
    /// Create an update that never expires
    pub fn new(key: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            data,
            expires_at: None,
        }
    }

    /// Set an absolute expiry (unix epoch milliseconds)
    pub fn expires_at(mut self, expires_at: i64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Expire the entry `ttl` from now
    pub fn expires_in(self, ttl: chrono::Duration) -> Self {
        let at = chrono::Utc::now() + ttl;
        self.expires_at(at.timestamp_millis())
    }
}

/// Input handed to an agent handler for one invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerRequest {
    pub task_id: String,
    pub agent_id: String,
    pub requester_id: String,
    pub intent: String,
    pub params: serde_json::Value,
}

impl HandlerRequest {
    /// Get a string parameter
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }

    /// Re-target the request at another agent, keeping task and requester
    pub fn for_agent(
        &self,
        agent_id: impl Into<String>,
        intent: impl Into<String>,
        params: serde_json::Value,
    ) -> Self {
        Self {
            task_id: self.task_id.clone(),
            agent_id: agent_id.into(),
            requester_id: self.requester_id.clone(),
            intent: intent.into(),
            params,
        }
    }
}

/// Output of a successful handler invocation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandlerOutput {
    pub result: serde_json::Value,
    #[serde(default)]
    pub memory_updates: Vec<MemoryUpdate>,
}

impl HandlerOutput {
    pub fn new(result: serde_json::Value) -> Self {
        Self {
            result,
            memory_updates: Vec::new(),
        }
    }

    pub fn with_memory(mut self, update: MemoryUpdate) -> Self {
        self.memory_updates.push(update);
        self
    }
}
