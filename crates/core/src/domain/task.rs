use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::submission::{Attachment, TaskSubmission};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// The agent phase a running task is currently in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    Think,
    Plan,
    Act,
    Review,
}

impl TaskPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Think => "think",
            Self::Plan => "plan",
            Self::Act => "act",
            Self::Review => "review",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "think" => Some(Self::Think),
            "plan" => Some(Self::Plan),
            "act" => Some(Self::Act),
            "review" => Some(Self::Review),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Task {
    pub id: Uuid,
    /// Caller-supplied task identifier, shared by every round of one project
    pub task: String,
    pub round: u32,
    pub nonce: String,
    pub email: String,
    pub brief: String,
    pub checks: Vec<String>,
    pub attachments: Vec<Attachment>,
    pub evaluation_url: Option<String>,
    pub phase: Option<TaskPhase>,
    pub status: TaskStatus,
    pub act_attempts: u32,
    pub repo_url: Option<String>,
    pub pages_url: Option<String>,
    pub commit_sha: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(task: impl Into<String>, round: u32, brief: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task: task.into(),
            round,
            nonce: Uuid::new_v4().to_string(),
            email: String::new(),
            brief: brief.into(),
            checks: Vec::new(),
            attachments: Vec::new(),
            evaluation_url: None,
            phase: None,
            status: TaskStatus::default(),
            act_attempts: 0,
            repo_url: None,
            pages_url: None,
            commit_sha: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_checks(mut self, checks: Vec<String>) -> Self {
        self.checks = checks;
        self
    }

    pub fn with_evaluation_url(mut self, url: impl Into<String>) -> Self {
        self.evaluation_url = Some(url.into());
        self
    }

    pub fn is_update(&self) -> bool {
        self.round > 1
    }
}

/// One entry of a task's append-only phase history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PhaseRecord {
    pub seq: u32,
    pub phase: TaskPhase,
    pub recorded_at: DateTime<Utc>,
}

impl From<TaskSubmission> for Task {
    fn from(submission: TaskSubmission) -> Self {
        let mut task = Task::new(submission.task, submission.round, submission.brief);
        task.nonce = submission.nonce;
        task.email = submission.email;
        task.checks = submission.checks;
        task.attachments = submission.attachments;
        task.evaluation_url = submission.evaluation_url;
        task
    }
}
