use events::Event;
use github::Deployment;
use sitesmith_core::{Task, TaskStatus};
use tracing::{debug, error, info, warn};

use crate::callback::CallbackPayload;
use crate::checks::ChecksReport;
use crate::error::{OrchestratorError, Result};
use crate::services::{
    ActPhase, AgentRun, ExecutorContext, PlanPhase, ReviewPhase, ThinkPhase,
};
use crate::state_machine::AgentState;

/// What a phase produced; the executor maps it to the next state.
#[derive(Debug, Clone)]
pub enum PhaseResult {
    Analyzed { provider: String },
    Planned { steps: usize },
    Generated { attempt: u32, lint_passed: bool },
    /// Review sends the task back to Act for attempt `attempt`
    RetryAct { attempt: u32 },
    Deployed(Deployment),
}

impl PhaseResult {
    pub fn next_state(&self) -> AgentState {
        match self {
            Self::Analyzed { .. } => AgentState::Plan,
            Self::Planned { .. } => AgentState::Act,
            Self::Generated { .. } => AgentState::Review,
            Self::RetryAct { .. } => AgentState::Act,
            Self::Deployed(_) => AgentState::Succeeded,
        }
    }
}

/// Terminal result of one task.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    /// Snapshot with the final status, phase and result fields
    pub task: Task,
    pub deployment: Option<Deployment>,
    pub checks: Option<ChecksReport>,
    pub error: Option<String>,
}

impl TaskOutcome {
    pub fn status(&self) -> TaskStatus {
        self.task.status
    }

    pub fn is_success(&self) -> bool {
        self.task.status == TaskStatus::Succeeded
    }
}

pub struct TaskExecutor {
    ctx: ExecutorContext,
}

impl TaskExecutor {
    pub fn new(ctx: ExecutorContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &ExecutorContext {
        &self.ctx
    }

    /// Run the loop to a terminal state, then deliver the callback.
    pub async fn run(&self, task: Task) -> Result<TaskOutcome> {
        let outcome = self.execute(task).await?;
        self.notify(&outcome).await;
        Ok(outcome)
    }

    /// Run the loop to a terminal state and persist it. No callback is sent.
    ///
    /// Task-level failures are reported through the outcome. `Err` means the
    /// failure itself could not be recorded; the callback has then already
    /// been attempted.
    pub async fn execute(&self, task: Task) -> Result<TaskOutcome> {
        info!(
            task_id = %task.id,
            task = %task.task,
            round = task.round,
            "Starting agent loop"
        );

        let workspace = match self.ctx.create_workspace(&task) {
            Ok(workspace) => workspace,
            Err(e) => return self.finish_failed(task, None, e.to_string()).await,
        };
        let mut run = AgentRun::new(task, workspace);

        let result = match self.ctx.begin(&mut run).await {
            Ok(()) => self.drive(&mut run).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(deployment) => self.finish_succeeded(run, deployment).await,
            Err(e) => {
                error!(
                    task_id = %run.task.id,
                    state = %run.state,
                    error = %e,
                    "Agent loop failed"
                );
                if !run.state.is_terminal() {
                    if let Err(transition_err) =
                        self.ctx.transition(&mut run, AgentState::Failed).await
                    {
                        warn!(task_id = %run.task.id, error = %transition_err, "Could not move to failed state");
                    }
                }
                let AgentRun { task, checks, .. } = run;
                self.finish_failed(task, checks, e.to_string()).await
            }
        }
    }

    async fn drive(&self, run: &mut AgentRun) -> Result<Deployment> {
        loop {
            let result = self.execute_phase(run).await?;
            debug!(task_id = %run.task.id, result = ?result, "Phase completed");

            let next = result.next_state();
            self.ctx.transition(run, next).await?;

            if let PhaseResult::Deployed(deployment) = result {
                return Ok(deployment);
            }
        }
    }

    pub async fn execute_phase(&self, run: &mut AgentRun) -> Result<PhaseResult> {
        match run.state {
            AgentState::Think => ThinkPhase::run(&self.ctx, run).await,
            AgentState::Plan => PlanPhase::run(&self.ctx, run).await,
            AgentState::Act => ActPhase::run(&self.ctx, run).await,
            AgentState::Review => ReviewPhase::run(&self.ctx, run).await,
            state @ (AgentState::Succeeded | AgentState::Failed) => {
                Err(OrchestratorError::InvalidTransition { from: state, to: state })
            }
        }
    }

    async fn finish_succeeded(&self, run: AgentRun, deployment: Deployment) -> Result<TaskOutcome> {
        let AgentRun { mut task, checks, .. } = run;

        if let Err(e) = self
            .ctx
            .task_repo
            .mark_succeeded(
                task.id,
                &deployment.repo_url,
                &deployment.pages_url,
                &deployment.commit_sha,
            )
            .await
        {
            error!(task_id = %task.id, error = %e, "Could not record successful deployment");
            let message = format!(
                "Deployed to {} but the result could not be recorded: {}",
                deployment.repo_url, e
            );
            return self.finish_failed(task, checks, message).await;
        }

        task.status = TaskStatus::Succeeded;
        task.repo_url = Some(deployment.repo_url.clone());
        task.pages_url = Some(deployment.pages_url.clone());
        task.commit_sha = Some(deployment.commit_sha.clone());
        task.error_message = None;

        info!(
            task_id = %task.id,
            repo_url = %deployment.repo_url,
            pages_url = %deployment.pages_url,
            act_attempts = task.act_attempts,
            "Task succeeded"
        );
        self.ctx.emit_event(Event::TaskCompleted {
            task_id: task.id,
            status: TaskStatus::Succeeded.as_str().to_string(),
            error: None,
        });

        Ok(TaskOutcome {
            task,
            deployment: Some(deployment),
            checks,
            error: None,
        })
    }

    async fn finish_failed(
        &self,
        mut task: Task,
        checks: Option<ChecksReport>,
        message: String,
    ) -> Result<TaskOutcome> {
        let persisted = self.ctx.task_repo.mark_failed(task.id, &message).await;

        task.status = TaskStatus::Failed;
        task.error_message = Some(message.clone());

        warn!(task_id = %task.id, error = %message, "Task failed");
        self.ctx.emit_event(Event::TaskCompleted {
            task_id: task.id,
            status: TaskStatus::Failed.as_str().to_string(),
            error: Some(message.clone()),
        });

        let outcome = TaskOutcome {
            task,
            deployment: None,
            checks,
            error: Some(message),
        };

        match persisted {
            Ok(()) => Ok(outcome),
            Err(e) => {
                error!(task_id = %outcome.task.id, error = %e, "Could not record task failure");
                self.notify(&outcome).await;
                Err(e.into())
            }
        }
    }

    /// Fail a task whose run was abandoned after `minutes`.
    pub async fn fail_timed_out(&self, task: Task, minutes: u64) -> Result<TaskOutcome> {
        let message = OrchestratorError::Timeout { minutes }.to_string();
        self.finish_failed(task, None, message).await
    }

    /// Fail every task a previous process left queued or running.
    ///
    /// Only records and publishes the failures; callers deliver the
    /// callbacks with [`notify`](Self::notify).
    pub async fn fail_interrupted(&self) -> Result<Vec<TaskOutcome>> {
        let message = OrchestratorError::Interrupted.to_string();
        let tasks = self.ctx.task_repo.fail_interrupted(&message).await?;

        Ok(tasks
            .into_iter()
            .map(|task| {
                warn!(
                    task_id = %task.id,
                    task = %task.task,
                    round = task.round,
                    "Task interrupted by restart, marked failed"
                );
                self.ctx.emit_event(Event::TaskCompleted {
                    task_id: task.id,
                    status: TaskStatus::Failed.as_str().to_string(),
                    error: Some(message.clone()),
                });
                TaskOutcome {
                    task,
                    deployment: None,
                    checks: None,
                    error: Some(message.clone()),
                }
            })
            .collect())
    }

    /// POST the outcome to the task's evaluation URL. Delivery problems never
    /// change the task's status.
    pub async fn notify(&self, outcome: &TaskOutcome) {
        let Some(url) = outcome.task.evaluation_url.as_deref() else {
            debug!(task_id = %outcome.task.id, "No evaluation URL, skipping callback");
            return;
        };

        let payload = match (&outcome.deployment, &outcome.error) {
            (Some(deployment), None) => CallbackPayload::succeeded(&outcome.task, deployment),
            (_, error) => CallbackPayload::failed(
                &outcome.task,
                error.clone().unwrap_or_else(|| "unknown error".to_string()),
            ),
        };

        match self.ctx.callback.send(url, &payload).await {
            Ok(attempts) => self.ctx.emit_event(Event::CallbackDelivered {
                task_id: outcome.task.id,
                url: url.to_string(),
                attempts,
            }),
            Err(e) => self.ctx.emit_event(Event::CallbackFailed {
                task_id: outcome.task.id,
                url: url.to_string(),
                error: e.to_string(),
            }),
        }
    }
}
