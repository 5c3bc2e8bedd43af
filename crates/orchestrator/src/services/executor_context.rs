use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use db::TaskRepository;
use events::{Event, EventBus, EventEnvelope};
use github::{Deployment, PagesDeployer, RepoTarget, SiteFile};
use llm::{FailoverClient, GenerationRequest, GenerationResponse};
use sitesmith_core::Task;
use tracing::{debug, info};

use crate::callback::{CallbackClient, CallbackPolicy};
use crate::checks::ChecksReport;
use crate::error::Result;
use crate::linter::{LintReport, Linter, LinterConfig};
use crate::prompts::AttachmentContext;
use crate::services::message_parser::{BuildPlan, SiteAnalysis};
use crate::state_machine::{AgentState, AgentStateMachine};
use crate::workspace::Workspace;

/// Immutable settings for the agent loop and the runner around it.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Act attempts per task: the original plus one regeneration
    pub max_act_attempts: u32,
    /// Parent of per-task workspaces; the system temp dir when `None`
    pub workspace_root: Option<PathBuf>,
    pub linter: LinterConfig,
    pub callback: CallbackPolicy,
    pub task_timeout: Duration,
    pub max_concurrent_tasks: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_act_attempts: 2,
            workspace_root: None,
            linter: LinterConfig::default(),
            callback: CallbackPolicy::default(),
            task_timeout: Duration::from_secs(10 * 60),
            max_concurrent_tasks: 3,
        }
    }
}

impl AgentConfig {
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    pub fn with_linter(mut self, linter: LinterConfig) -> Self {
        self.linter = linter;
        self
    }

    pub fn with_callback_policy(mut self, policy: CallbackPolicy) -> Self {
        self.callback = policy;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn with_max_concurrent_tasks(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max.max(1);
        self
    }
}

/// Repository and files of the round a task is updating.
#[derive(Debug, Clone)]
pub struct PreviousDeployment {
    pub target: RepoTarget,
    pub files: Vec<SiteFile>,
}

/// Mutable state of one pass through the loop.
#[derive(Debug)]
pub struct AgentRun {
    pub task: Task,
    pub state: AgentState,
    pub workspace: Workspace,
    pub attachments: Vec<AttachmentContext>,
    pub previous: Option<PreviousDeployment>,
    pub analysis: Option<SiteAnalysis>,
    pub plan: Option<BuildPlan>,
    /// Latest generated text files by path
    pub files: BTreeMap<String, String>,
    pub lint: Option<LintReport>,
    pub checks: Option<ChecksReport>,
    pub deployment: Option<Deployment>,
}

impl AgentRun {
    pub fn new(task: Task, workspace: Workspace) -> Self {
        Self {
            task,
            state: AgentState::Think,
            workspace,
            attachments: Vec::new(),
            previous: None,
            analysis: None,
            plan: None,
            files: BTreeMap::new(),
            lint: None,
            checks: None,
            deployment: None,
        }
    }
}

pub struct ExecutorContext {
    pub config: AgentConfig,
    pub llm: FailoverClient,
    pub deployer: Arc<dyn PagesDeployer>,
    pub linter: Arc<dyn Linter>,
    pub task_repo: TaskRepository,
    pub event_bus: Option<EventBus>,
    pub callback: CallbackClient,
}

impl ExecutorContext {
    pub fn new(
        config: AgentConfig,
        llm: FailoverClient,
        deployer: Arc<dyn PagesDeployer>,
        task_repo: TaskRepository,
    ) -> Self {
        let linter = config.linter.build();
        let callback = CallbackClient::new(config.callback.clone());
        Self {
            config,
            llm,
            deployer,
            linter,
            task_repo,
            event_bus: None,
            callback,
        }
    }

    pub fn with_linter(mut self, linter: Arc<dyn Linter>) -> Self {
        self.linter = linter;
        self
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn with_callback_client(mut self, client: CallbackClient) -> Self {
        self.callback = client;
        self
    }

    pub fn create_workspace(&self, task: &Task) -> Result<Workspace> {
        Workspace::create(self.config.workspace_root.as_deref(), task.id)
    }

    /// Record the first phase of a fresh run.
    pub async fn begin(&self, run: &mut AgentRun) -> Result<()> {
        self.task_repo.mark_running(run.task.id).await?;
        self.record_phase(run, AgentState::Think).await?;
        self.emit_event(Event::TaskPhaseChanged {
            task_id: run.task.id,
            from: None,
            to: AgentState::Think.as_str().to_string(),
        });
        Ok(())
    }

    /// Guarded move to `to`. Working states are persisted before the move is published.
    pub async fn transition(&self, run: &mut AgentRun, to: AgentState) -> Result<()> {
        let from = run.state;
        info!(
            task_id = %run.task.id,
            from = %from,
            to = %to,
            act_attempts = run.task.act_attempts,
            "Agent state transition"
        );

        AgentStateMachine::validate_transition(
            from,
            to,
            run.task.act_attempts,
            self.config.max_act_attempts,
        )?;

        if to.phase().is_some() {
            self.record_phase(run, to).await?;
        }
        run.state = to;

        if !to.is_terminal() {
            self.emit_event(Event::TaskPhaseChanged {
                task_id: run.task.id,
                from: Some(from.as_str().to_string()),
                to: to.as_str().to_string(),
            });
        }

        debug!(task_id = %run.task.id, state = %to, "State transition completed");
        Ok(())
    }

    async fn record_phase(&self, run: &mut AgentRun, state: AgentState) -> Result<()> {
        if let Some(phase) = state.phase() {
            self.task_repo.record_phase(run.task.id, phase).await?;
            run.task.phase = Some(phase);
            run.state = state;
        }
        Ok(())
    }

    pub async fn generate(
        &self,
        task: &Task,
        request: GenerationRequest,
    ) -> Result<GenerationResponse> {
        debug!(
            task_id = %task.id,
            kind = request.kind.as_str(),
            prompt_length = request.prompt.len(),
            "Requesting generation"
        );
        let response = self.llm.generate(&request).await?;
        info!(
            task_id = %task.id,
            kind = request.kind.as_str(),
            provider = %response.provider,
            response_length = response.text.len(),
            "Generation complete"
        );
        Ok(response)
    }

    pub fn emit_event(&self, event: Event) {
        if let Some(ref bus) = self.event_bus {
            bus.publish(EventEnvelope::new(event));
        }
    }
}
