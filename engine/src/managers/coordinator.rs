//! Delegation and scatter/gather across subordinates

use futures::future::join_all;
use sdk::{HandlerRequest, OrchestrationError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::Manager;

/// Gathered results of a multi-agent delegation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinationResult {
    /// At least one subordinate succeeded and no required one failed
    pub success: bool,
    /// Results keyed by subordinate id
    pub results: BTreeMap<String, serde_json::Value>,
    /// Error messages keyed by subordinate id
    pub failures: BTreeMap<String, String>,
}

impl CoordinationResult {
    pub fn failure_summary(&self) -> String {
        self.failures
            .iter()
            .map(|(id, error)| format!("{}: {}", id, error))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl Manager {
    /// Hand one request to a direct subordinate
    pub async fn delegate_task(
        &self,
        requester_id: &str,
        subordinate_id: &str,
        intent: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, OrchestrationError> {
        self.ensure_supervises(subordinate_id)?;

        let descriptor = self
            .invoker
            .registry()
            .get(subordinate_id)
            .ok_or_else(|| OrchestrationError::UnknownAgent(subordinate_id.to_string()))?;

        debug!(
            manager = %self.id(),
            subordinate = %subordinate_id,
            task_id = %self.task_id,
            "Delegating '{}'",
            intent
        );
        self.log_activity(
            requester_id,
            "delegated",
            json!({ "taskId": self.task_id, "to": subordinate_id, "intent": intent }),
        )
        .await;

        let request = HandlerRequest {
            task_id: self.task_id.clone(),
            agent_id: subordinate_id.to_string(),
            requester_id: requester_id.to_string(),
            intent: intent.to_string(),
            params,
        };

        let outcome = self.invoker.invoke(descriptor, request).await?;
        self.hold_updates(outcome.updates);
        Ok(outcome.result)
    }

    /// Run the same intent on several subordinates concurrently
    ///
    /// A subordinate's failure is recorded under its id and does not stop
    /// its siblings. Succeeds when at least one subordinate succeeded.
    pub async fn coordinate_multi_agent_task(
        &self,
        requester_id: &str,
        subordinate_ids: &[String],
        intent: &str,
        params: serde_json::Value,
    ) -> Result<CoordinationResult, OrchestrationError> {
        self.coordinate_with(requester_id, subordinate_ids, &[], intent, params)
            .await
    }

    /// Like `coordinate_multi_agent_task`, but a failure of any id in
    /// `required` makes the result unsuccessful
    pub async fn coordinate_with(
        &self,
        requester_id: &str,
        subordinate_ids: &[String],
        required: &[String],
        intent: &str,
        params: serde_json::Value,
    ) -> Result<CoordinationResult, OrchestrationError> {
        // duplicates would run twice and overwrite each other's result
        let mut targets: Vec<&str> = Vec::with_capacity(subordinate_ids.len());
        for id in subordinate_ids {
            if !targets.contains(&id.as_str()) {
                targets.push(id);
            }
        }

        // reject the whole batch before anything runs
        for id in targets.iter().copied().chain(required.iter().map(String::as_str)) {
            self.ensure_supervises(id)?;
        }

        info!(
            manager = %self.id(),
            subordinates = targets.len(),
            "Coordinating '{}'",
            intent
        );

        let runs = targets.iter().map(|&id| {
            let params = params.clone();
            async move { (id, self.delegate_task(requester_id, id, intent, params).await) }
        });

        let mut coordinated = CoordinationResult::default();
        for (id, outcome) in join_all(runs).await {
            match outcome {
                Ok(result) => {
                    coordinated.results.insert(id.to_string(), result);
                }
                Err(e) => {
                    warn!(manager = %self.id(), subordinate = %id, "Delegation failed: {}", e);
                    coordinated.failures.insert(id.to_string(), e.to_string());
                }
            }
        }

        let required_failed = required
            .iter()
            .any(|id| coordinated.failures.contains_key(id));
        coordinated.success = !coordinated.results.is_empty() && !required_failed;

        self.log_activity(
            requester_id,
            "coordinated",
            json!({
                "taskId": self.task_id,
                "intent": intent,
                "succeeded": coordinated.results.keys().collect::<Vec<_>>(),
                "failed": coordinated.failures.keys().collect::<Vec<_>>(),
            }),
        )
        .await;

        Ok(coordinated)
    }

    fn ensure_supervises(&self, subordinate_id: &str) -> Result<(), OrchestrationError> {
        if self.descriptor.supervises(subordinate_id) {
            Ok(())
        } else {
            Err(OrchestrationError::NotSupervised {
                manager: self.id().to_string(),
                subordinate: subordinate_id.to_string(),
            })
        }
    }
}
