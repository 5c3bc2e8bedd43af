use chrono::{DateTime, TimeZone, Utc};
use sitesmith_core::{PhaseRecord, Task, TaskPhase, TaskStatus};
use uuid::Uuid;

use crate::error::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRow {
    pub id: String,
    pub task: String,
    pub round: i64,
    pub nonce: String,
    pub email: String,
    pub brief: String,
    pub checks: String,
    pub attachments: String,
    pub evaluation_url: Option<String>,
    pub phase: Option<String>,
    pub status: String,
    pub act_attempts: i64,
    pub repo_url: Option<String>,
    pub pages_url: Option<String>,
    pub commit_sha: Option<String>,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl TryFrom<TaskRow> for Task {
    type Error = DbError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let corrupt = |column: &'static str, reason: String| DbError::Serialization {
            id: row.id.clone(),
            column,
            reason,
        };

        let id = Uuid::parse_str(&row.id).map_err(|e| corrupt("id", e.to_string()))?;
        let round = u32::try_from(row.round).map_err(|e| corrupt("round", e.to_string()))?;
        let checks: Vec<String> =
            serde_json::from_str(&row.checks).map_err(|e| corrupt("checks", e.to_string()))?;
        let attachments = serde_json::from_str(&row.attachments)
            .map_err(|e| corrupt("attachments", e.to_string()))?;
        let status = TaskStatus::parse(&row.status)
            .ok_or_else(|| corrupt("status", format!("unknown status '{}'", row.status)))?;
        let phase = match row.phase.as_deref() {
            Some(name) => Some(
                TaskPhase::parse(name)
                    .ok_or_else(|| corrupt("phase", format!("unknown phase '{}'", name)))?,
            ),
            None => None,
        };
        let act_attempts = u32::try_from(row.act_attempts)
            .map_err(|e| corrupt("act_attempts", e.to_string()))?;

        Ok(Task {
            id,
            task: row.task,
            round,
            nonce: row.nonce,
            email: row.email,
            brief: row.brief,
            checks,
            attachments,
            evaluation_url: row.evaluation_url,
            phase,
            status,
            act_attempts,
            repo_url: row.repo_url,
            pages_url: row.pages_url,
            commit_sha: row.commit_sha,
            error_message: row.error_message,
            created_at: timestamp_to_datetime(row.created_at),
            updated_at: timestamp_to_datetime(row.updated_at),
            started_at: row.started_at.map(timestamp_to_datetime),
            completed_at: row.completed_at.map(timestamp_to_datetime),
        })
    }
}

impl From<&Task> for TaskRow {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.to_string(),
            task: task.task.clone(),
            round: i64::from(task.round),
            nonce: task.nonce.clone(),
            email: task.email.clone(),
            brief: task.brief.clone(),
            checks: serde_json::to_string(&task.checks).unwrap_or_else(|_| "[]".to_string()),
            attachments: serde_json::to_string(&task.attachments)
                .unwrap_or_else(|_| "[]".to_string()),
            evaluation_url: task.evaluation_url.clone(),
            phase: task.phase.map(|p| p.as_str().to_string()),
            status: task.status.as_str().to_string(),
            act_attempts: i64::from(task.act_attempts),
            repo_url: task.repo_url.clone(),
            pages_url: task.pages_url.clone(),
            commit_sha: task.commit_sha.clone(),
            error_message: task.error_message.clone(),
            created_at: datetime_to_timestamp(task.created_at),
            updated_at: datetime_to_timestamp(task.updated_at),
            started_at: task.started_at.map(datetime_to_timestamp),
            completed_at: task.completed_at.map(datetime_to_timestamp),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PhaseRow {
    pub seq: i64,
    pub phase: String,
    pub recorded_at: i64,
}

impl PhaseRow {
    /// Rows with an unknown phase name are skipped by callers.
    pub fn into_domain(self) -> Option<PhaseRecord> {
        Some(PhaseRecord {
            seq: u32::try_from(self.seq).ok()?,
            phase: TaskPhase::parse(&self.phase)?,
            recorded_at: timestamp_to_datetime(self.recorded_at),
        })
    }
}

pub(crate) fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_default()
}

pub(crate) fn datetime_to_timestamp(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}
