//! Agent Registry
//!
//! The static catalog of every agent the dispatcher may route to. The
//! catalog is loaded once at start-up, validated as a whole, and read-only
//! afterwards; an id that is not in it can never be dispatched.

use sdk::{AccessTier, OrchestrationError, Severity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

mod catalog;

/// Catalog shipped with the engine
const BUILTIN_CATALOG: &str = include_str!("../../catalog/agents.toml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentCategory {
    Customer,
    Admin,
    Monitoring,
    Executive,
    Operational,
    Specialist,
}

impl AgentCategory {
    pub fn as_str(&self) -> &str {
        match self {
            AgentCategory::Customer => "customer",
            AgentCategory::Admin => "admin",
            AgentCategory::Monitoring => "monitoring",
            AgentCategory::Executive => "executive",
            AgentCategory::Operational => "operational",
            AgentCategory::Specialist => "specialist",
        }
    }
}

/// A named operation an agent declares
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,

    /// Keys that must be present in the request params
    #[serde(default)]
    pub required_params: Vec<String>,

    /// Subordinates a manager hands this capability to
    #[serde(default)]
    pub delegate_agents: Vec<String>,
}

impl Capability {
    /// Required params missing from `params`
    pub fn missing_params(&self, params: &serde_json::Value) -> Vec<&str> {
        self.required_params
            .iter()
            .filter(|key| params.get(key.as_str()).map_or(true, |v| v.is_null()))
            .map(String::as_str)
            .collect()
    }
}

/// Immutable description of one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub id: String,

    pub display_name: String,

    pub category: AgentCategory,

    /// Model override passed to the completion service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    pub access_tier: AccessTier,

    /// 1 = executive through 4 = support; `None` for specialists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervision_tier: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervisor_id: Option<String>,

    #[serde(default, rename = "supervises")]
    pub subordinate_ids: Vec<String>,

    #[serde(default)]
    pub capabilities: Vec<Capability>,

    /// Severity used when this agent escalates
    #[serde(default)]
    pub criticality: Severity,
}

impl AgentDescriptor {
    /// Tiers 1-3 supervise other agents
    pub fn is_manager(&self) -> bool {
        matches!(self.supervision_tier, Some(1..=3))
    }

    pub fn supervises(&self, agent_id: &str) -> bool {
        self.subordinate_ids.iter().any(|id| id == agent_id)
    }

    pub fn capability(&self, name: &str) -> Option<&Capability> {
        self.capabilities.iter().find(|c| c.name == name)
    }
}

/// Validated, read-only agent catalog
#[derive(Debug, Clone)]
pub struct Registry {
    /// Catalog order
    agents: Vec<Arc<AgentDescriptor>>,
    index: HashMap<String, usize>,
}

impl Registry {
    /// Build a registry from descriptors, rejecting an inconsistent hierarchy
    pub fn new(agents: Vec<AgentDescriptor>) -> Result<Self, OrchestrationError> {
        catalog::validate(&agents)?;

        let index = agents
            .iter()
            .enumerate()
            .map(|(i, a)| (a.id.clone(), i))
            .collect();

        Ok(Self {
            agents: agents.into_iter().map(Arc::new).collect(),
            index,
        })
    }

    /// The catalog bundled with the engine
    pub fn builtin() -> Result<Self, OrchestrationError> {
        Self::from_toml_str(BUILTIN_CATALOG)
    }

    /// Parse a catalog document
    pub fn from_toml_str(contents: &str) -> Result<Self, OrchestrationError> {
        Self::new(catalog::parse(contents)?)
    }

    /// Load a catalog file
    pub fn load(path: &Path) -> Result<Self, OrchestrationError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            OrchestrationError::Config(format!("Failed to read catalog {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn get(&self, agent_id: &str) -> Option<Arc<AgentDescriptor>> {
        self.index.get(agent_id).map(|&i| self.agents[i].clone())
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.index.contains_key(agent_id)
    }

    pub fn all(&self) -> &[Arc<AgentDescriptor>] {
        &self.agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Ids of every agent a caller with `tier` may use, in catalog order
    pub fn accessible_to(&self, tier: AccessTier) -> Vec<String> {
        self.agents
            .iter()
            .filter(|a| tier.satisfies(a.access_tier))
            .map(|a| a.id.clone())
            .collect()
    }
}
