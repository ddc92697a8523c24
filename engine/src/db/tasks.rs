/// Task ledger persistence
///
/// Every submitted task gets one row. Transitions are guarded updates
/// (`UPDATE ... WHERE status IN (...)`) so a row that reached a terminal
/// state is never mutated again, and each transition reports whether it
/// actually applied. All queries use parameterized queries for SQL
/// injection prevention.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::memory::{upsert_in, ScopedUpdate};
use super::now_millis;

/// Progress recorded when a task moves to running
pub const STARTED_PROGRESS: i64 = 10;

/// Task status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Completed, failed and cancelled are final
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    fn parse(s: &str) -> Self {
        match s {
            "pending" => TaskStatus::Pending,
            "running" => TaskStatus::Running,
            "completed" => TaskStatus::Completed,
            "cancelled" => TaskStatus::Cancelled,
            _ => TaskStatus::Failed,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub requester_id: String,
    pub agent_id: String,
    pub intent: String,
    pub params: serde_json::Value,
    pub status: TaskStatus,
    pub progress: i64,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

const TASK_COLUMNS: &str = "id, requester_id, agent_id, intent, params, status, progress, \
                            result, error, created_at, updated_at";

fn task_from_row(r: &SqliteRow) -> Task {
    let params: String = r.get("params");
    let result: Option<String> = r.get("result");

    Task {
        id: r.get("id"),
        requester_id: r.get("requester_id"),
        agent_id: r.get("agent_id"),
        intent: r.get("intent"),
        params: serde_json::from_str(&params).unwrap_or(serde_json::Value::Null),
        status: TaskStatus::parse(&r.get::<String, _>("status")),
        progress: r.get("progress"),
        result: result.and_then(|s| serde_json::from_str(&s).ok()),
        error: r.get("error"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

/// Task repository for database operations
#[derive(Clone)]
pub struct TaskRepository {
    pool: SqlitePool,
}

impl TaskRepository {
    /// Create a new task repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a new task in `pending` state with progress 0
    pub async fn create_task(
        &self,
        id: &str,
        requester_id: &str,
        agent_id: &str,
        intent: &str,
        params: &serde_json::Value,
    ) -> Result<Task> {
        let now = now_millis();
        let params_json = serde_json::to_string(params).context("Failed to encode params")?;

        sqlx::query(
            "INSERT INTO tasks (id, requester_id, agent_id, intent, params, status, progress, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(id)
        .bind(requester_id)
        .bind(agent_id)
        .bind(intent)
        .bind(&params_json)
        .bind(TaskStatus::Pending.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create task")?;

        Ok(Task {
            id: id.to_string(),
            requester_id: requester_id.to_string(),
            agent_id: agent_id.to_string(),
            intent: intent.to_string(),
            params: params.clone(),
            status: TaskStatus::Pending,
            progress: 0,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// pending → running, progress 10
    pub async fn start_task(&self, task_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'running', progress = ?, updated_at = ? \
             WHERE id = ? AND status = 'pending'",
        )
        .bind(STARTED_PROGRESS)
        .bind(now_millis())
        .bind(task_id)
        .execute(&self.pool)
        .await
        .context("Failed to start task")?;

        Ok(result.rows_affected() > 0)
    }

    /// Report progress on a running task
    ///
    /// The value is clamped to 1..=99; only completion may record 100.
    pub async fn update_progress(&self, task_id: &str, progress: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE tasks SET progress = ?, updated_at = ? WHERE id = ? AND status = 'running'",
        )
        .bind(progress.clamp(1, 99))
        .bind(now_millis())
        .bind(task_id)
        .execute(&self.pool)
        .await
        .context("Failed to update task progress")?;

        Ok(result.rows_affected() > 0)
    }

    /// running → completed, progress 100
    pub async fn complete_task(&self, task_id: &str, result: &serde_json::Value) -> Result<bool> {
        self.complete_with_memory(task_id, result, &[]).await
    }

    /// Complete a running task and apply its memory updates atomically
    ///
    /// If the task is no longer running (cancelled while the handler was in
    /// flight) the transaction is rolled back and no memory is written.
    pub async fn complete_with_memory(
        &self,
        task_id: &str,
        result: &serde_json::Value,
        updates: &[ScopedUpdate],
    ) -> Result<bool> {
        let now = now_millis();
        let result_json = serde_json::to_string(result).context("Failed to encode result")?;

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let applied = sqlx::query(
            "UPDATE tasks SET status = 'completed', progress = 100, result = ?, updated_at = ? \
             WHERE id = ? AND status = 'running'",
        )
        .bind(&result_json)
        .bind(now)
        .bind(task_id)
        .execute(&mut *tx)
        .await
        .context("Failed to complete task")?
        .rows_affected()
            > 0;

        if !applied {
            tx.rollback()
                .await
                .context("Failed to roll back completion")?;
            return Ok(false);
        }

        for update in updates {
            upsert_in(&mut tx, update, now).await?;
        }

        tx.commit().await.context("Failed to commit completion")?;
        Ok(true)
    }

    /// pending|running → failed
    pub async fn fail_task(&self, task_id: &str, error: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'failed', error = ?, updated_at = ? \
             WHERE id = ? AND status IN ('pending', 'running')",
        )
        .bind(error)
        .bind(now_millis())
        .bind(task_id)
        .execute(&self.pool)
        .await
        .context("Failed to mark task as failed")?;

        Ok(result.rows_affected() > 0)
    }

    /// pending|running → cancelled
    pub async fn cancel_task(&self, task_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'cancelled', updated_at = ? \
             WHERE id = ? AND status IN ('pending', 'running')",
        )
        .bind(now_millis())
        .bind(task_id)
        .execute(&self.pool)
        .await
        .context("Failed to cancel task")?;

        Ok(result.rows_affected() > 0)
    }

    /// Get a task by ID
    pub async fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        let sql = format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch task")?;

        Ok(row.as_ref().map(task_from_row))
    }

    /// Get recent tasks, newest first
    pub async fn get_recent_tasks(&self, limit: i64) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {} FROM tasks ORDER BY created_at DESC, rowid DESC LIMIT ?",
            TASK_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch recent tasks")?;

        Ok(rows.iter().map(task_from_row).collect())
    }

    /// Get recent tasks submitted by one requester, newest first
    pub async fn get_tasks_for_requester(&self, requester_id: &str, limit: i64) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {} FROM tasks WHERE requester_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ?",
            TASK_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(requester_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch requester tasks")?;

        Ok(rows.iter().map(task_from_row).collect())
    }

    /// Delete terminal tasks last touched before `cutoff` (epoch ms)
    pub async fn delete_old_tasks(&self, cutoff: i64) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM tasks WHERE updated_at < ? \
             AND status IN ('completed', 'failed', 'cancelled')",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .context("Failed to delete old tasks")?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use sdk::MemoryUpdate;
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Database) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
        (temp_dir, db)
    }

    #[tokio::test]
    async fn test_task_lifecycle() {
        let (_dir, db) = setup().await;
        let repo = db.tasks();

        let task = repo
            .create_task("t1", "u1", "trip-planner", "plan", &json!({"city": "Lisbon"}))
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.progress, 0);

        assert!(repo.start_task("t1").await.unwrap());
        let running = repo.get_task("t1").await.unwrap().unwrap();
        assert_eq!(running.status, TaskStatus::Running);
        assert_eq!(running.progress, STARTED_PROGRESS);

        assert!(repo.complete_task("t1", &json!({"ok": true})).await.unwrap());
        let done = repo.get_task("t1").await.unwrap().unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.progress, 100);
        assert_eq!(done.result, Some(json!({"ok": true})));
        assert_eq!(done.params["city"], "Lisbon");
    }

    #[tokio::test]
    async fn test_terminal_states_are_final() {
        let (_dir, db) = setup().await;
        let repo = db.tasks();

        repo.create_task("t1", "u1", "a", "i", &json!({})).await.unwrap();
        repo.start_task("t1").await.unwrap();
        assert!(repo.fail_task("t1", "boom").await.unwrap());

        assert!(!repo.complete_task("t1", &json!(1)).await.unwrap());
        assert!(!repo.cancel_task("t1").await.unwrap());
        assert!(!repo.start_task("t1").await.unwrap());
        assert!(!repo.update_progress("t1", 50).await.unwrap());

        let task = repo.get_task("t1").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_progress_is_clamped_below_completion() {
        let (_dir, db) = setup().await;
        let repo = db.tasks();

        repo.create_task("t1", "u1", "a", "i", &json!({})).await.unwrap();
        repo.start_task("t1").await.unwrap();
        repo.update_progress("t1", 250).await.unwrap();

        let task = repo.get_task("t1").await.unwrap().unwrap();
        assert_eq!(task.progress, 99);
        assert_eq!(task.status, TaskStatus::Running);
    }

    #[tokio::test]
    async fn test_cancelled_completion_discards_memory() {
        let (_dir, db) = setup().await;
        let repo = db.tasks();

        repo.create_task("t1", "u1", "trip-planner", "plan", &json!({}))
            .await
            .unwrap();
        repo.start_task("t1").await.unwrap();
        assert!(repo.cancel_task("t1").await.unwrap());

        let updates = vec![ScopedUpdate::new(
            "trip-planner",
            "u1",
            MemoryUpdate::new("last_itinerary", json!("day 1")),
        )];
        let applied = repo
            .complete_with_memory("t1", &json!("late"), &updates)
            .await
            .unwrap();
        assert!(!applied);

        let memory = db
            .memory()
            .get_memory("trip-planner", "u1", "last_itinerary")
            .await
            .unwrap();
        assert!(memory.is_none());
        let task = repo.get_task("t1").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_requester_history_and_cleanup() {
        let (_dir, db) = setup().await;
        let repo = db.tasks();

        for i in 0..3 {
            let id = format!("t{}", i);
            repo.create_task(&id, "u1", "a", "i", &json!({})).await.unwrap();
            repo.start_task(&id).await.unwrap();
            repo.complete_task(&id, &json!(i)).await.unwrap();
        }
        repo.create_task("other", "u2", "a", "i", &json!({})).await.unwrap();

        assert_eq!(repo.get_tasks_for_requester("u1", 10).await.unwrap().len(), 3);
        assert_eq!(repo.get_recent_tasks(2).await.unwrap().len(), 2);

        let deleted = repo.delete_old_tasks(now_millis() + 1_000).await.unwrap();
        assert_eq!(deleted, 3);
        // pending task survives cleanup
        assert!(repo.get_task("other").await.unwrap().is_some());
    }
}
