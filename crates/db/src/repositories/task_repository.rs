use crate::error::DbError;
use crate::models::{datetime_to_timestamp, timestamp_to_datetime, PhaseRow, TaskRow};
use chrono::Utc;
use sitesmith_core::{PhaseRecord, Task, TaskPhase, TaskStatus};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

const TASK_COLUMNS: &str = "id, task, round, nonce, email, brief, checks, attachments, \
     evaluation_url, phase, status, act_attempts, repo_url, pages_url, commit_sha, \
     error_message, created_at, updated_at, started_at, completed_at";

#[derive(Clone)]
pub struct TaskRepository {
    pool: SqlitePool,
}

impl TaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, task: &Task) -> Result<Task, DbError> {
        let row = TaskRow::from(task);

        let result = sqlx::query(
            r#"
            INSERT INTO tasks (id, task, round, nonce, email, brief, checks, attachments,
                               evaluation_url, phase, status, act_attempts, repo_url, pages_url,
                               commit_sha, error_message, created_at, updated_at, started_at,
                               completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.task)
        .bind(row.round)
        .bind(&row.nonce)
        .bind(&row.email)
        .bind(&row.brief)
        .bind(&row.checks)
        .bind(&row.attachments)
        .bind(&row.evaluation_url)
        .bind(&row.phase)
        .bind(&row.status)
        .bind(row.act_attempts)
        .bind(&row.repo_url)
        .bind(&row.pages_url)
        .bind(&row.commit_sha)
        .bind(&row.error_message)
        .bind(row.created_at)
        .bind(row.updated_at)
        .bind(row.started_at)
        .bind(row.completed_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(task.clone()),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Err(DbError::DuplicateNonce(task.nonce.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Task>, DbError> {
        let row: Option<TaskRow> =
            sqlx::query_as(&format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(Task::try_from).transpose()
    }

    pub async fn find_by_nonce(&self, nonce: &str) -> Result<Option<Task>, DbError> {
        let row: Option<TaskRow> =
            sqlx::query_as(&format!("SELECT {} FROM tasks WHERE nonce = ?", TASK_COLUMNS))
                .bind(nonce)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Task::try_from).transpose()
    }

    /// Most recent round submitted for a task identifier.
    pub async fn find_latest_by_task(&self, task: &str) -> Result<Option<Task>, DbError> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tasks WHERE task = ? ORDER BY round DESC, created_at DESC LIMIT 1",
            TASK_COLUMNS
        ))
        .bind(task)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Task::try_from).transpose()
    }

    /// Latest successful deployment of `task` from a round before `before_round`.
    pub async fn find_previous_deployment(
        &self,
        task: &str,
        before_round: u32,
    ) -> Result<Option<Task>, DbError> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM tasks
            WHERE task = ? AND round < ? AND status = 'succeeded' AND repo_url IS NOT NULL
            ORDER BY round DESC, completed_at DESC
            LIMIT 1
            "#,
            TASK_COLUMNS
        ))
        .bind(task)
        .bind(i64::from(before_round))
        .fetch_optional(&self.pool)
        .await?;

        row.map(Task::try_from).transpose()
    }

    pub async fn find_all(&self, limit: u32) -> Result<Vec<Task>, DbError> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tasks ORDER BY created_at DESC LIMIT ?",
            TASK_COLUMNS
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Task::try_from).collect()
    }

    pub async fn mark_running(&self, id: Uuid) -> Result<(), DbError> {
        let now = datetime_to_timestamp(Utc::now());
        let result = sqlx::query(
            "UPDATE tasks SET status = ?, started_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(TaskStatus::Running.as_str())
        .bind(now)
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Self::ensure_updated(id, result.rows_affected())
    }

    /// Set the current phase and append it to the phase history atomically.
    pub async fn record_phase(&self, id: Uuid, phase: TaskPhase) -> Result<u32, DbError> {
        let now = datetime_to_timestamp(Utc::now());
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE tasks SET phase = ?, updated_at = ? WHERE id = ?")
            .bind(phase.as_str())
            .bind(now)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        Self::ensure_updated(id, result.rows_affected())?;

        let (seq,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM task_phases WHERE task_id = ?",
        )
        .bind(id.to_string())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO task_phases (task_id, seq, phase, recorded_at) VALUES (?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(seq)
        .bind(phase.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(task_id = %id, phase = %phase.as_str(), seq, "Phase recorded");

        Ok(u32::try_from(seq).unwrap_or(u32::MAX))
    }

    pub async fn record_act_attempt(&self, id: Uuid, attempts: u32) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE tasks SET act_attempts = ?, updated_at = ? WHERE id = ?")
            .bind(i64::from(attempts))
            .bind(datetime_to_timestamp(Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Self::ensure_updated(id, result.rows_affected())
    }

    pub async fn mark_succeeded(
        &self,
        id: Uuid,
        repo_url: &str,
        pages_url: &str,
        commit_sha: &str,
    ) -> Result<(), DbError> {
        let now = datetime_to_timestamp(Utc::now());
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = ?, repo_url = ?, pages_url = ?, commit_sha = ?, error_message = NULL,
                completed_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(TaskStatus::Succeeded.as_str())
        .bind(repo_url)
        .bind(pages_url)
        .bind(commit_sha)
        .bind(now)
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Self::ensure_updated(id, result.rows_affected())
    }

    pub async fn mark_failed(&self, id: Uuid, message: &str) -> Result<(), DbError> {
        let now = datetime_to_timestamp(Utc::now());
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = ?, error_message = ?, completed_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(TaskStatus::Failed.as_str())
        .bind(message)
        .bind(now)
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Self::ensure_updated(id, result.rows_affected())
    }

    /// Fail every task still queued or running, e.g. after a restart left
    /// them without a live run. Returns the tasks as they now read.
    pub async fn fail_interrupted(&self, message: &str) -> Result<Vec<Task>, DbError> {
        let now = datetime_to_timestamp(Utc::now());
        let mut tx = self.pool.begin().await?;

        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tasks WHERE status IN (?, ?) ORDER BY created_at",
            TASK_COLUMNS
        ))
        .bind(TaskStatus::Queued.as_str())
        .bind(TaskStatus::Running.as_str())
        .fetch_all(&mut *tx)
        .await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query(
            r#"
            UPDATE tasks
            SET status = ?, error_message = ?, completed_at = ?, updated_at = ?
            WHERE status IN (?, ?)
            "#,
        )
        .bind(TaskStatus::Failed.as_str())
        .bind(message)
        .bind(now)
        .bind(now)
        .bind(TaskStatus::Queued.as_str())
        .bind(TaskStatus::Running.as_str())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        rows.into_iter()
            .map(|row| -> Result<Task, DbError> {
                let mut task = Task::try_from(row)?;
                task.status = TaskStatus::Failed;
                task.error_message = Some(message.to_string());
                task.completed_at = Some(timestamp_to_datetime(now));
                task.updated_at = timestamp_to_datetime(now);
                Ok(task)
            })
            .collect()
    }

    pub async fn phase_history(&self, id: Uuid) -> Result<Vec<PhaseRecord>, DbError> {
        let rows: Vec<PhaseRow> = sqlx::query_as(
            "SELECT seq, phase, recorded_at FROM task_phases WHERE task_id = ? ORDER BY seq",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(PhaseRow::into_domain).collect())
    }

    fn ensure_updated(id: Uuid, rows_affected: u64) -> Result<(), DbError> {
        if rows_affected == 0 {
            Err(DbError::TaskNotFound(id))
        } else {
            Ok(())
        }
    }
}
