//! Think, Plan, Act, Review agent loop that turns a brief into a deployed site.

pub mod callback;
pub mod checks;
pub mod error;
pub mod executor;
pub mod linter;
pub mod prompts;
pub mod runner;
pub mod services;
pub mod site_docs;
pub mod state_machine;
pub mod workspace;

pub use callback::{CallbackClient, CallbackPayload, CallbackPolicy};
pub use checks::{CheckResult, CheckVerdict, ChecksReport};
pub use error::{OrchestratorError, Result};
pub use executor::{PhaseResult, TaskExecutor, TaskOutcome};
pub use linter::{CommandLinter, LintReport, Linter, LinterConfig, StaticLinter};
pub use runner::TaskRunner;
pub use services::{AgentConfig, AgentRun, ExecutorContext};
pub use state_machine::{AgentState, AgentStateMachine};
pub use workspace::Workspace;
