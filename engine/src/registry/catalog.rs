//! Catalog parsing and hierarchy validation

use sdk::OrchestrationError;
use serde::Deserialize;
use std::collections::HashMap;

use super::AgentDescriptor;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    agents: Vec<AgentDescriptor>,
}

pub(super) fn parse(contents: &str) -> Result<Vec<AgentDescriptor>, OrchestrationError> {
    let file: CatalogFile = toml::from_str(contents)
        .map_err(|e| OrchestrationError::Config(format!("Failed to parse agent catalog: {}", e)))?;
    Ok(file.agents)
}

fn invalid(msg: String) -> OrchestrationError {
    OrchestrationError::Config(format!("Invalid agent catalog: {}", msg))
}

/// Check the catalog as a whole.
///
/// - ids are unique and non-empty
/// - tiers are 1..=4; a tiered agent's supervisor sits exactly one tier up,
///   tier 1 has no supervisor and every other tier has one
/// - a specialist's supervisor, if any, is a manager
/// - `supervises` and `supervisor_id` agree in both directions
/// - only managers supervise, and capability delegates are subordinates
pub(super) fn validate(agents: &[AgentDescriptor]) -> Result<(), OrchestrationError> {
    let mut by_id: HashMap<&str, &AgentDescriptor> = HashMap::new();
    for agent in agents {
        if agent.id.trim().is_empty() {
            return Err(invalid("agent with empty id".to_string()));
        }
        if by_id.insert(agent.id.as_str(), agent).is_some() {
            return Err(invalid(format!("duplicate agent id '{}'", agent.id)));
        }
    }

    for agent in agents {
        if let Some(tier) = agent.supervision_tier {
            if !(1..=4).contains(&tier) {
                return Err(invalid(format!(
                    "'{}' has supervision tier {} (expected 1-4)",
                    agent.id, tier
                )));
            }
        }

        match (&agent.supervisor_id, agent.supervision_tier) {
            (Some(_), Some(1)) => {
                return Err(invalid(format!(
                    "'{}' is tier 1 and cannot have a supervisor",
                    agent.id
                )));
            }
            (None, Some(tier)) if tier > 1 => {
                return Err(invalid(format!(
                    "'{}' is tier {} but has no supervisor",
                    agent.id, tier
                )));
            }
            (Some(supervisor_id), tier) => {
                let supervisor = by_id.get(supervisor_id.as_str()).ok_or_else(|| {
                    invalid(format!(
                        "'{}' reports to unknown agent '{}'",
                        agent.id, supervisor_id
                    ))
                })?;

                match tier {
                    Some(tier) => {
                        if supervisor.supervision_tier != Some(tier - 1) {
                            return Err(invalid(format!(
                                "'{}' (tier {}) must report to a tier {} agent, not '{}'",
                                agent.id,
                                tier,
                                tier - 1,
                                supervisor_id
                            )));
                        }
                    }
                    None => {
                        if !supervisor.is_manager() {
                            return Err(invalid(format!(
                                "'{}' reports to '{}', which is not a manager",
                                agent.id, supervisor_id
                            )));
                        }
                    }
                }

                if !supervisor.supervises(&agent.id) {
                    return Err(invalid(format!(
                        "'{}' reports to '{}' but is not in its supervises list",
                        agent.id, supervisor_id
                    )));
                }
            }
            _ => {}
        }

        if !agent.subordinate_ids.is_empty() && !agent.is_manager() {
            return Err(invalid(format!(
                "'{}' supervises agents but is not a tier 1-3 manager",
                agent.id
            )));
        }

        for sub_id in &agent.subordinate_ids {
            let sub = by_id.get(sub_id.as_str()).ok_or_else(|| {
                invalid(format!("'{}' supervises unknown agent '{}'", agent.id, sub_id))
            })?;
            if sub.supervisor_id.as_deref() != Some(agent.id.as_str()) {
                return Err(invalid(format!(
                    "'{}' supervises '{}' but '{}' does not report to it",
                    agent.id, sub_id, sub_id
                )));
            }
        }

        for capability in &agent.capabilities {
            for delegate in &capability.delegate_agents {
                if !agent.supervises(delegate) {
                    return Err(invalid(format!(
                        "capability '{}' of '{}' delegates to '{}', which it does not supervise",
                        capability.name, agent.id, delegate
                    )));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::Registry;

    fn err_of(toml: &str) -> String {
        Registry::from_toml_str(toml).unwrap_err().to_string()
    }

    const HEAD: &str = r#"
[[agents]]
id = "boss"
display_name = "Boss"
category = "executive"
access_tier = "admin"
supervision_tier = 1
supervises = ["mid"]
"#;

    #[test]
    fn test_rejects_skipped_level() {
        let toml = format!(
            "{}{}",
            HEAD,
            r#"
[[agents]]
id = "mid"
display_name = "Mid"
category = "operational"
access_tier = "admin"
supervision_tier = 3
supervisor_id = "boss"
"#
        );
        assert!(err_of(&toml).contains("must report to a tier 2"));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let toml = format!("{}{}", HEAD, HEAD);
        assert!(err_of(&toml).contains("duplicate"));
    }

    #[test]
    fn test_rejects_unknown_subordinate() {
        assert!(err_of(HEAD).contains("unknown agent 'mid'"));
    }

    #[test]
    fn test_rejects_delegate_outside_subordinates() {
        let toml = r#"
[[agents]]
id = "boss"
display_name = "Boss"
category = "executive"
access_tier = "admin"
supervision_tier = 1

[[agents.capabilities]]
name = "anything"
delegate_agents = ["stranger"]

[[agents]]
id = "stranger"
display_name = "Stranger"
category = "specialist"
access_tier = "guest"
"#;
        assert!(err_of(toml).contains("does not supervise"));
    }

    #[test]
    fn test_accepts_consistent_hierarchy() {
        let toml = format!(
            "{}{}",
            HEAD,
            r#"
[[agents]]
id = "mid"
display_name = "Mid"
category = "operational"
access_tier = "premium"
supervision_tier = 2
supervisor_id = "boss"
supervises = ["worker"]

[[agents]]
id = "worker"
display_name = "Worker"
category = "specialist"
access_tier = "guest"
supervisor_id = "mid"
"#
        );
        let registry = Registry::from_toml_str(&toml).unwrap();
        assert_eq!(registry.len(), 3);
    }
}
