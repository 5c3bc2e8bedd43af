use github::RepoTarget;
use llm::{GenerationRequest, OutputKind};
use tracing::{info, warn};

use crate::error::Result;
use crate::executor::PhaseResult;
use crate::prompts::{AttachmentContext, PhasePrompts, ANALYST_SYSTEM};
use crate::services::executor_context::{AgentRun, ExecutorContext, PreviousDeployment};
use crate::services::message_parser::MessageParser;

/// Files carried over from the previous round.
pub const CARRIED_FILES: [&str; 3] = ["index.html", "style.css", "script.js"];

/// Gathers context (attachments, the previous round) and asks for a requirements analysis.
pub struct ThinkPhase;

impl ThinkPhase {
    pub async fn run(ctx: &ExecutorContext, run: &mut AgentRun) -> Result<PhaseResult> {
        info!(
            task_id = %run.task.id,
            task = %run.task.task,
            round = run.task.round,
            "Starting THINK phase"
        );

        Self::load_attachments(ctx, run).await?;
        if run.task.is_update() {
            run.previous = Self::load_previous_deployment(ctx, run).await?;
        }

        let request = GenerationRequest::new(OutputKind::Analysis, PhasePrompts::think(&run.task))
            .with_system(ANALYST_SYSTEM);
        let response = ctx.generate(&run.task, request).await?;

        let analysis = MessageParser::parse_analysis(&response.text, &run.task.checks);
        info!(
            task_id = %run.task.id,
            complexity = %analysis.complexity,
            components = analysis.key_components.len(),
            "Requirements analysed"
        );
        run.analysis = Some(analysis);

        Ok(PhaseResult::Analyzed {
            provider: response.provider,
        })
    }

    async fn load_attachments(ctx: &ExecutorContext, run: &mut AgentRun) -> Result<()> {
        let saved = run
            .workspace
            .save_attachments(&run.task.attachments, ctx.callback.http())
            .await?;

        let mut contexts = Vec::with_capacity(saved.len());
        for name in saved {
            let content = run.workspace.read_file(&name).await?.unwrap_or_default();
            contexts.push(AttachmentContext::new(name, &content));
        }
        run.attachments = contexts;
        Ok(())
    }

    async fn load_previous_deployment(
        ctx: &ExecutorContext,
        run: &AgentRun,
    ) -> Result<Option<PreviousDeployment>> {
        let task = &run.task;
        let Some(previous) = ctx
            .task_repo
            .find_previous_deployment(&task.task, task.round)
            .await?
        else {
            info!(
                task_id = %task.id,
                task = %task.task,
                round = task.round,
                "No previous deployment found, building as a new project"
            );
            return Ok(None);
        };

        let Some(target) = previous.repo_url.as_deref().and_then(RepoTarget::parse_url) else {
            warn!(
                task_id = %task.id,
                repo_url = ?previous.repo_url,
                "Previous deployment has an unusable repository URL, building as a new project"
            );
            return Ok(None);
        };

        let files = ctx.deployer.fetch_files(&target, &CARRIED_FILES).await?;
        info!(
            task_id = %task.id,
            repo = %target.full_name(),
            previous_round = previous.round,
            files = files.len(),
            "Loaded previous deployment"
        );

        Ok(Some(PreviousDeployment { target, files }))
    }
}
