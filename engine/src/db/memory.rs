//! Agent memory repository
//!
//! Short-lived values keyed by `(agent_id, requester_id, key)`. Writes are
//! last-write-wins unless the caller supplies the version it read, in which
//! case the write only lands if nobody else wrote in between. Expired rows
//! read as absent and are removed by a periodic sweep.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sdk::{MemoryUpdate, MemoryView, OrchestrationError};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::now_millis;

/// A stored memory value
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    pub agent_id: String,
    pub requester_id: String,
    pub key: String,
    pub data: serde_json::Value,
    pub version: i64,
    pub expires_at: Option<i64>,
    pub updated_at: i64,
}

impl MemoryEntry {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A handler's memory intent bound to the agent and requester that own it
#[derive(Debug, Clone)]
pub struct ScopedUpdate {
    pub agent_id: String,
    pub requester_id: String,
    pub update: MemoryUpdate,
}

impl ScopedUpdate {
    pub fn new(
        agent_id: impl Into<String>,
        requester_id: impl Into<String>,
        update: MemoryUpdate,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            requester_id: requester_id.into(),
            update,
        }
    }
}

fn entry_from_row(row: &SqliteRow) -> MemoryEntry {
    let data: String = row.get("data");
    MemoryEntry {
        agent_id: row.get("agent_id"),
        requester_id: row.get("requester_id"),
        key: row.get("key"),
        data: serde_json::from_str(&data).unwrap_or(serde_json::Value::Null),
        version: row.get("version"),
        expires_at: row.get("expires_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Last-write-wins upsert on an existing connection or transaction
pub(crate) async fn upsert_in(
    conn: &mut SqliteConnection,
    scoped: &ScopedUpdate,
    now: i64,
) -> Result<i64> {
    let data = serde_json::to_string(&scoped.update.data).context("Failed to encode memory")?;

    let version: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO agent_memory (agent_id, requester_id, key, data, version, expires_at, updated_at)
        VALUES (?, ?, ?, ?, 1, ?, ?)
        ON CONFLICT(agent_id, requester_id, key) DO UPDATE SET
            data = excluded.data,
            version = agent_memory.version + 1,
            expires_at = excluded.expires_at,
            updated_at = excluded.updated_at
        RETURNING version
        "#,
    )
    .bind(&scoped.agent_id)
    .bind(&scoped.requester_id)
    .bind(&scoped.update.key)
    .bind(&data)
    .bind(scoped.update.expires_at)
    .bind(now)
    .fetch_one(&mut *conn)
    .await
    .context("Failed to write memory")?;

    Ok(version)
}

/// Repository for per-agent memory
#[derive(Clone)]
pub struct MemoryRepository {
    pool: SqlitePool,
}

impl MemoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Write one value and return its new version
    ///
    /// With `version` set, the write succeeds only when the stored version
    /// equals it (a missing or expired row counts as version 0); otherwise it
    /// fails with `OrchestrationError::VersionConflict`.
    pub async fn set_memory(
        &self,
        agent_id: &str,
        requester_id: &str,
        update: MemoryUpdate,
        version: Option<i64>,
    ) -> Result<i64> {
        let now = now_millis();
        let scoped = ScopedUpdate::new(agent_id, requester_id, update);

        let Some(expected) = version else {
            let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
            return upsert_in(&mut conn, &scoped, now).await;
        };

        let data = serde_json::to_string(&scoped.update.data).context("Failed to encode memory")?;

        // check and write in one statement; a losing writer affects no rows
        let written = if expected == 0 {
            sqlx::query(
                r#"
                INSERT INTO agent_memory (agent_id, requester_id, key, data, version, expires_at, updated_at)
                VALUES (?, ?, ?, ?, 1, ?, ?)
                ON CONFLICT(agent_id, requester_id, key) DO UPDATE SET
                    data = excluded.data,
                    version = 1,
                    expires_at = excluded.expires_at,
                    updated_at = excluded.updated_at
                WHERE agent_memory.expires_at IS NOT NULL AND agent_memory.expires_at <= ?
                "#,
            )
            .bind(agent_id)
            .bind(requester_id)
            .bind(&scoped.update.key)
            .bind(&data)
            .bind(scoped.update.expires_at)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await
        } else {
            sqlx::query(
                r#"
                UPDATE agent_memory
                SET data = ?, version = version + 1, expires_at = ?, updated_at = ?
                WHERE agent_id = ? AND requester_id = ? AND key = ?
                  AND version = ?
                  AND (expires_at IS NULL OR expires_at > ?)
                "#,
            )
            .bind(&data)
            .bind(scoped.update.expires_at)
            .bind(now)
            .bind(agent_id)
            .bind(requester_id)
            .bind(&scoped.update.key)
            .bind(expected)
            .bind(now)
            .execute(&self.pool)
            .await
        }
        .context("Failed to write memory")?;

        if written.rows_affected() == 0 {
            let found = self
                .get_entry(agent_id, requester_id, &scoped.update.key)
                .await?
                .map(|entry| entry.version)
                .unwrap_or(0);
            return Err(OrchestrationError::VersionConflict {
                key: scoped.update.key,
                expected,
                found,
            }
            .into());
        }

        Ok(expected + 1)
    }

    /// Read a value; expired entries read as absent
    pub async fn get_memory(
        &self,
        agent_id: &str,
        requester_id: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>> {
        Ok(self
            .get_entry(agent_id, requester_id, key)
            .await?
            .map(|entry| entry.data))
    }

    /// Read a value with its version and expiry
    pub async fn get_entry(
        &self,
        agent_id: &str,
        requester_id: &str,
        key: &str,
    ) -> Result<Option<MemoryEntry>> {
        let row = sqlx::query(
            r#"
            SELECT agent_id, requester_id, key, data, version, expires_at, updated_at
            FROM agent_memory
            WHERE agent_id = ? AND requester_id = ? AND key = ?
            "#,
        )
        .bind(agent_id)
        .bind(requester_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to read memory")?;

        let now = now_millis();
        Ok(row
            .as_ref()
            .map(entry_from_row)
            .filter(|entry| !entry.is_expired(now)))
    }

    /// Remove a value, returning whether one existed
    pub async fn delete_memory(&self, agent_id: &str, requester_id: &str, key: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM agent_memory WHERE agent_id = ? AND requester_id = ? AND key = ?",
        )
        .bind(agent_id)
        .bind(requester_id)
        .bind(key)
        .execute(&self.pool)
        .await
        .context("Failed to delete memory")?;

        Ok(result.rows_affected() > 0)
    }

    /// Apply a batch of updates in one transaction
    pub async fn apply_updates(&self, updates: &[ScopedUpdate]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let now = now_millis();
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        for update in updates {
            upsert_in(&mut tx, update, now).await?;
        }
        tx.commit().await.context("Failed to commit memory updates")?;

        debug!("Applied {} memory updates", updates.len());
        Ok(())
    }

    /// Delete every expired row
    pub async fn sweep_expired(&self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM agent_memory WHERE expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(now_millis())
        .execute(&self.pool)
        .await
        .context("Failed to sweep expired memory")?;

        Ok(result.rows_affected())
    }

    /// Run `sweep_expired` on a fixed interval until the handle is aborted
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let repo = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match repo.sweep_expired().await {
                    Ok(0) => {}
                    Ok(n) => info!("Swept {} expired memory entries", n),
                    Err(e) => warn!("Memory sweep failed: {}", e),
                }
            }
        })
    }

    /// A read-only view restricted to one agent and requester
    pub fn scoped(&self, agent_id: &str, requester_id: &str) -> ScopedMemory {
        ScopedMemory {
            repo: self.clone(),
            agent_id: agent_id.to_string(),
            requester_id: requester_id.to_string(),
        }
    }
}

/// `MemoryView` over a single `(agent_id, requester_id)` pair
pub struct ScopedMemory {
    repo: MemoryRepository,
    agent_id: String,
    requester_id: String,
}

#[async_trait]
impl MemoryView for ScopedMemory {
    async fn recall(&self, key: &str) -> Result<Option<serde_json::Value>, OrchestrationError> {
        self.repo
            .get_memory(&self.agent_id, &self.requester_id, key)
            .await
            .map_err(|e| OrchestrationError::Database(e.to_string()))
    }
}
