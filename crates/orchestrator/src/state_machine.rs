use std::fmt;

use sitesmith_core::TaskPhase;

use crate::error::{OrchestratorError, Result};

/// Position of one task inside the agent loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentState {
    Think,
    Plan,
    Act,
    Review,
    Succeeded,
    Failed,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Think => "think",
            Self::Plan => "plan",
            Self::Act => "act",
            Self::Review => "review",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Persisted phase for working states; `None` once terminal.
    pub fn phase(&self) -> Option<TaskPhase> {
        match self {
            Self::Think => Some(TaskPhase::Think),
            Self::Plan => Some(TaskPhase::Plan),
            Self::Act => Some(TaskPhase::Act),
            Self::Review => Some(TaskPhase::Review),
            Self::Succeeded | Self::Failed => None,
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guarded transitions of the Think, Plan, Act, Review loop.
///
/// The only backward edge is Review to Act, and it is open only while
/// `act_attempts < max_act_attempts`.
pub struct AgentStateMachine;

impl AgentStateMachine {
    pub fn validate_transition(
        from: AgentState,
        to: AgentState,
        act_attempts: u32,
        max_act_attempts: u32,
    ) -> Result<()> {
        if Self::allowed_transitions(from, act_attempts, max_act_attempts).contains(&to) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidTransition { from, to })
        }
    }

    fn allowed_transitions(
        from: AgentState,
        act_attempts: u32,
        max_act_attempts: u32,
    ) -> Vec<AgentState> {
        match from {
            AgentState::Think => vec![AgentState::Plan, AgentState::Failed],
            AgentState::Plan => vec![AgentState::Act, AgentState::Failed],
            AgentState::Act => vec![AgentState::Review, AgentState::Failed],
            AgentState::Review if act_attempts < max_act_attempts => {
                vec![AgentState::Succeeded, AgentState::Act, AgentState::Failed]
            }
            AgentState::Review => vec![AgentState::Succeeded, AgentState::Failed],
            AgentState::Succeeded | AgentState::Failed => vec![],
        }
    }

    pub fn can_transition(
        from: AgentState,
        to: AgentState,
        act_attempts: u32,
        max_act_attempts: u32,
    ) -> bool {
        Self::validate_transition(from, to, act_attempts, max_act_attempts).is_ok()
    }

    pub fn can_retry_act(act_attempts: u32, max_act_attempts: u32) -> bool {
        Self::can_transition(
            AgentState::Review,
            AgentState::Act,
            act_attempts,
            max_act_attempts,
        )
    }

    pub fn next_state(current: AgentState) -> Option<AgentState> {
        match current {
            AgentState::Think => Some(AgentState::Plan),
            AgentState::Plan => Some(AgentState::Act),
            AgentState::Act => Some(AgentState::Review),
            AgentState::Review => Some(AgentState::Succeeded),
            AgentState::Succeeded | AgentState::Failed => None,
        }
    }
}
