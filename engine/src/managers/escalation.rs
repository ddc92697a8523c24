//! Escalation and audit emission
//!
//! Both are fire-and-forget: records go onto the message bus and the
//! `AuditWriter` persists them in the background.

use sdk::Severity;
use serde_json::json;
use tracing::{error, warn};

use super::Manager;
use crate::db::{now_millis, EscalationRecord};
use crate::message_bus::{Event, MessageBus};
use crate::registry::AgentDescriptor;

/// Escalate from `from` to its declared supervisor
///
/// The target is always `from.supervisor_id`. A top-tier agent has none, so
/// its escalation is terminal and is also raised as an operator alert.
pub async fn escalate(
    bus: &MessageBus,
    from: &AgentDescriptor,
    requester_id: &str,
    message: &str,
    context: serde_json::Value,
    severity: Severity,
) -> EscalationRecord {
    let record = EscalationRecord {
        id: uuid::Uuid::new_v4().to_string(),
        from_agent_id: from.id.clone(),
        to_supervisor_id: from.supervisor_id.clone(),
        requester_id: requester_id.to_string(),
        message: message.to_string(),
        context,
        severity,
        created_at: now_millis(),
    };

    match &record.to_supervisor_id {
        Some(supervisor) => warn!(
            from = %record.from_agent_id,
            to = %supervisor,
            severity = %severity,
            "Escalating: {}",
            message
        ),
        None => error!(
            from = %record.from_agent_id,
            severity = %severity,
            "Terminal escalation, operator attention required: {}",
            message
        ),
    }

    bus.publish(Event::Escalated(record.clone())).await;
    if record.is_terminal() {
        bus.publish(Event::OperatorAlert(record.clone())).await;
    }

    record
}

impl Manager {
    /// Report a problem to this manager's supervisor
    pub async fn escalate_to_supervisor(
        &self,
        requester_id: &str,
        message: &str,
        context: serde_json::Value,
        severity: Severity,
    ) -> EscalationRecord {
        escalate(&self.bus, &self.descriptor, requester_id, message, context, severity).await
    }

    /// Escalate a failed intent at this manager's declared criticality
    pub(crate) async fn escalate_failure(
        &self,
        requester_id: &str,
        intent: &str,
        error: &sdk::OrchestrationError,
    ) -> EscalationRecord {
        use sdk::ConciergeErrorExt;
        self.escalate_to_supervisor(
            requester_id,
            &format!("{} failed '{}': {}", self.id(), intent, error),
            json!({ "taskId": self.task_id, "intent": intent, "code": error.code() }),
            self.descriptor.criticality,
        )
        .await
    }

    /// Write an audit record; never read back by orchestration logic
    pub async fn log_activity(&self, requester_id: &str, event: &str, metadata: serde_json::Value) {
        self.bus
            .publish(Event::ActivityLogged {
                agent_id: self.id().to_string(),
                requester_id: requester_id.to_string(),
                event: event.to_string(),
                metadata,
            })
            .await;
    }
}
