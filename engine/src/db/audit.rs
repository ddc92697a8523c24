//! Audit trail and escalation records
//!
//! Both tables are append-only. Rows arrive through the `AuditWriter`, which
//! drains the message bus in the background so a slow or failing write never
//! holds up the task that produced it.

use anyhow::{Context, Result};
use sdk::Severity;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::now_millis;
use crate::message_bus::{Event, EventType, MessageBus};

/// One `log_activity` record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: i64,
    pub agent_id: String,
    pub requester_id: String,
    pub event: String,
    pub metadata: serde_json::Value,
    pub created_at: i64,
}

/// A manager's report of an unresolved failure to the tier above it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub id: String,
    pub from_agent_id: String,
    /// `None` only for the top of the hierarchy; such escalations go to a
    /// human operator instead
    pub to_supervisor_id: Option<String>,
    pub requester_id: String,
    pub message: String,
    pub context: serde_json::Value,
    pub severity: Severity,
    pub created_at: i64,
}

impl EscalationRecord {
    pub fn is_terminal(&self) -> bool {
        self.to_supervisor_id.is_none()
    }
}

fn escalation_from_row(r: &SqliteRow) -> EscalationRecord {
    let context: String = r.get("context");
    let severity: String = r.get("severity");
    EscalationRecord {
        id: r.get("id"),
        from_agent_id: r.get("from_agent_id"),
        to_supervisor_id: r.get("to_supervisor_id"),
        requester_id: r.get("requester_id"),
        message: r.get("message"),
        context: serde_json::from_str(&context).unwrap_or(serde_json::Value::Null),
        severity: severity.parse().unwrap_or_default(),
        created_at: r.get("created_at"),
    }
}

const ESCALATION_COLUMNS: &str =
    "id, from_agent_id, to_supervisor_id, requester_id, message, context, severity, created_at";

/// Repository for the audit and escalation tables
#[derive(Clone)]
pub struct AuditRepository {
    pool: SqlitePool,
}

impl AuditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn record_activity(
        &self,
        agent_id: &str,
        requester_id: &str,
        event: &str,
        metadata: &serde_json::Value,
    ) -> Result<i64> {
        let metadata = serde_json::to_string(metadata).context("Failed to encode metadata")?;

        let result = sqlx::query(
            "INSERT INTO activity_log (agent_id, requester_id, event, metadata, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(agent_id)
        .bind(requester_id)
        .bind(event)
        .bind(&metadata)
        .bind(now_millis())
        .execute(&self.pool)
        .await
        .context("Failed to record activity")?;

        Ok(result.last_insert_rowid())
    }

    pub async fn record_escalation(&self, record: &EscalationRecord) -> Result<()> {
        let context = serde_json::to_string(&record.context).context("Failed to encode context")?;

        sqlx::query(
            "INSERT INTO escalations (id, from_agent_id, to_supervisor_id, requester_id, message, context, severity, terminal, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.from_agent_id)
        .bind(&record.to_supervisor_id)
        .bind(&record.requester_id)
        .bind(&record.message)
        .bind(&context)
        .bind(record.severity.as_str())
        .bind(record.is_terminal())
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to record escalation")?;

        Ok(())
    }

    /// Most recent audit records for one agent
    pub async fn recent_activity(&self, agent_id: &str, limit: i64) -> Result<Vec<ActivityRecord>> {
        let rows = sqlx::query(
            "SELECT id, agent_id, requester_id, event, metadata, created_at FROM activity_log \
             WHERE agent_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(agent_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch activity")?;

        Ok(rows
            .iter()
            .map(|r| {
                let metadata: String = r.get("metadata");
                ActivityRecord {
                    id: r.get("id"),
                    agent_id: r.get("agent_id"),
                    requester_id: r.get("requester_id"),
                    event: r.get("event"),
                    metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
                    created_at: r.get("created_at"),
                }
            })
            .collect())
    }

    /// Escalations raised by one agent, newest first
    pub async fn escalations_for(&self, from_agent_id: &str) -> Result<Vec<EscalationRecord>> {
        let sql = format!(
            "SELECT {} FROM escalations WHERE from_agent_id = ? ORDER BY created_at DESC, rowid DESC",
            ESCALATION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(from_agent_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch escalations")?;

        Ok(rows.iter().map(escalation_from_row).collect())
    }

    pub async fn recent_escalations(&self, limit: i64) -> Result<Vec<EscalationRecord>> {
        let sql = format!(
            "SELECT {} FROM escalations ORDER BY created_at DESC, rowid DESC LIMIT ?",
            ESCALATION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch escalations")?;

        Ok(rows.iter().map(escalation_from_row).collect())
    }
}

/// Persists audit and escalation events published on the bus
pub struct AuditWriter;

impl AuditWriter {
    /// Subscribe to the bus and persist events until every sender is gone
    ///
    /// The subscription is registered before this returns, so no event
    /// published afterwards is missed.
    pub async fn spawn(repo: AuditRepository, bus: &MessageBus) -> JoinHandle<()> {
        let mut rx = bus.subscribe(EventType::All).await;

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    Event::ActivityLogged {
                        agent_id,
                        requester_id,
                        event,
                        metadata,
                    } => {
                        if let Err(e) = repo
                            .record_activity(&agent_id, &requester_id, &event, &metadata)
                            .await
                        {
                            warn!("Dropping activity record for {}: {:#}", agent_id, e);
                        }
                    }
                    Event::Escalated(record) => {
                        if let Err(e) = repo.record_escalation(&record).await {
                            warn!("Dropping escalation {}: {:#}", record.id, e);
                        }
                    }
                    Event::OperatorAlert(record) => {
                        error!(
                            escalation_id = %record.id,
                            from = %record.from_agent_id,
                            severity = %record.severity,
                            "Operator attention required: {}",
                            record.message
                        );
                    }
                    other => debug!("Audit writer ignoring {:?}", other.event_type()),
                }
            }
            debug!("Audit writer stopped");
        })
    }
}
