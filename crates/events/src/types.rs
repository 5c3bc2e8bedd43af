//! Event types published while tasks move through the agent loop

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Envelope wrapping all events with metadata
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: Event,
}

impl EventEnvelope {
    pub fn new(event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type")]
pub enum Event {
    /// A submission was persisted and queued
    #[serde(rename = "task.accepted")]
    TaskAccepted {
        task_id: Uuid,
        task: String,
        round: u32,
    },

    /// Agent loop moved between phases. `from` is absent for the first phase.
    #[serde(rename = "task.phase_changed")]
    TaskPhaseChanged {
        task_id: Uuid,
        from: Option<String>,
        to: String,
    },

    /// An Act-phase generation attempt started
    #[serde(rename = "task.act_attempt")]
    ActAttempt { task_id: Uuid, attempt: u32 },

    #[serde(rename = "task.lint_failed")]
    LintFailed {
        task_id: Uuid,
        attempt: u32,
        output: String,
    },

    #[serde(rename = "task.deployed")]
    TaskDeployed {
        task_id: Uuid,
        repo_url: String,
        pages_url: String,
        commit_sha: String,
    },

    /// Terminal status reached
    #[serde(rename = "task.completed")]
    TaskCompleted {
        task_id: Uuid,
        status: String,
        error: Option<String>,
    },

    #[serde(rename = "callback.delivered")]
    CallbackDelivered {
        task_id: Uuid,
        url: String,
        attempts: u32,
    },

    #[serde(rename = "callback.failed")]
    CallbackFailed {
        task_id: Uuid,
        url: String,
        error: String,
    },

    #[serde(rename = "error")]
    Error {
        message: String,
        context: Option<String>,
    },
}

impl Event {
    /// Wire name, also used as the SSE event type.
    pub fn name(&self) -> &'static str {
        match self {
            Event::TaskAccepted { .. } => "task.accepted",
            Event::TaskPhaseChanged { .. } => "task.phase_changed",
            Event::ActAttempt { .. } => "task.act_attempt",
            Event::LintFailed { .. } => "task.lint_failed",
            Event::TaskDeployed { .. } => "task.deployed",
            Event::TaskCompleted { .. } => "task.completed",
            Event::CallbackDelivered { .. } => "callback.delivered",
            Event::CallbackFailed { .. } => "callback.failed",
            Event::Error { .. } => "error",
        }
    }

    pub fn task_id(&self) -> Option<Uuid> {
        match self {
            Event::TaskAccepted { task_id, .. }
            | Event::TaskPhaseChanged { task_id, .. }
            | Event::ActAttempt { task_id, .. }
            | Event::LintFailed { task_id, .. }
            | Event::TaskDeployed { task_id, .. }
            | Event::TaskCompleted { task_id, .. }
            | Event::CallbackDelivered { task_id, .. }
            | Event::CallbackFailed { task_id, .. } => Some(*task_id),
            Event::Error { .. } => None,
        }
    }
}
