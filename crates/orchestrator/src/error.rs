use thiserror::Error;

use crate::state_machine::AgentState;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: AgentState, to: AgentState },

    #[error("LLM generation failed: {0}")]
    Llm(#[from] llm::LlmError),

    #[error("Deployment failed: {0}")]
    GitHub(#[from] github::GitHubError),

    #[error("Database error: {0}")]
    Database(#[from] db::DbError),

    #[error("Lint failed after {attempts} attempt(s): {output}")]
    Lint { attempts: u32, output: String },

    #[error("Linter could not run: {0}")]
    LinterUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Invalid attachment: {0}")]
    Attachment(#[from] sitesmith_core::CoreError),

    #[error("Callback to {url} failed after {attempts} attempt(s): {reason}")]
    Callback {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("Task timed out after {minutes} minutes")]
    Timeout { minutes: u64 },

    #[error("Task was interrupted by a service restart before it finished")]
    Interrupted,
}

impl OrchestratorError {
    pub fn workspace(reason: impl Into<String>) -> Self {
        Self::Workspace(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
