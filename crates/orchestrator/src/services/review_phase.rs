use events::Event;
use github::{repo_name_for, SiteFile};
use llm::{GenerationRequest, OutputKind};
use tracing::{info, warn};

use crate::checks::ChecksReport;
use crate::error::{OrchestratorError, Result};
use crate::executor::PhaseResult;
use crate::linter::LintReport;
use crate::prompts::PhasePrompts;
use crate::services::executor_context::{AgentRun, ExecutorContext};
use crate::services::message_parser::{BuildPlan, SiteAnalysis};
use crate::site_docs::{self, ReadmeContext, LICENSE_PATH, README_PATH};
use crate::state_machine::AgentStateMachine;

/// Decides between regeneration, failure and deployment.
pub struct ReviewPhase;

impl ReviewPhase {
    pub async fn run(ctx: &ExecutorContext, run: &mut AgentRun) -> Result<PhaseResult> {
        let attempts = run.task.act_attempts;
        info!(task_id = %run.task.id, act_attempts = attempts, "Starting REVIEW phase");

        let report = run
            .lint
            .clone()
            .unwrap_or_else(|| LintReport::failed("No lint result recorded"));
        if !report.passed {
            if AgentStateMachine::can_retry_act(attempts, ctx.config.max_act_attempts) {
                info!(
                    task_id = %run.task.id,
                    next_attempt = attempts + 1,
                    "Lint failed, regenerating with linter output"
                );
                return Ok(PhaseResult::RetryAct {
                    attempt: attempts + 1,
                });
            }
            return Err(OrchestratorError::Lint {
                attempts,
                output: report.output,
            });
        }

        let deployment = Self::deploy(ctx, run).await?;
        Ok(PhaseResult::Deployed(deployment))
    }

    async fn deploy(ctx: &ExecutorContext, run: &mut AgentRun) -> Result<github::Deployment> {
        let target = match &run.previous {
            Some(previous) => previous.target.clone(),
            None => {
                ctx.deployer
                    .resolve_target(&repo_name_for(&run.task.task))
                    .await?
            }
        };

        run.workspace
            .write_file(
                LICENSE_PATH,
                site_docs::mit_license(site_docs::current_year(), &target.owner),
            )
            .await?;

        // README is evaluated as present so a "has a README" check can pass
        let mut files = run.workspace.collect_files().await?;
        files.retain(|f| f.path != README_PATH);
        let mut with_readme = files.clone();
        with_readme.push(SiteFile::new(README_PATH, "pending"));
        let checks = ChecksReport::evaluate(&run.task.checks, &with_readme);
        info!(task_id = %run.task.id, checks = %checks.summary(), "Acceptance checks evaluated");

        let explanation = Self::explain(ctx, run).await;
        let mut names: Vec<String> = with_readme.iter().map(|f| f.path.clone()).collect();
        names.sort();

        let analysis_fallback;
        let analysis = match run.analysis.as_ref() {
            Some(analysis) => analysis,
            None => {
                analysis_fallback = SiteAnalysis::fallback(&run.task.checks);
                &analysis_fallback
            }
        };
        let plan_fallback;
        let plan = match run.plan.as_ref() {
            Some(plan) => plan,
            None => {
                plan_fallback = BuildPlan::fallback();
                &plan_fallback
            }
        };

        let readme = site_docs::readme(&ReadmeContext {
            task: &run.task,
            analysis,
            plan,
            files: &names,
            repo_url: &target.repo_url(),
            pages_url: &target.pages_url(),
            checks: &checks,
            explanation: explanation.as_deref(),
        });
        run.workspace.write_file(README_PATH, &readme).await?;
        files.push(SiteFile::new(README_PATH, readme));

        let message = commit_message(run);
        info!(
            task_id = %run.task.id,
            repo = %target.full_name(),
            files = files.len(),
            "Deploying site"
        );
        let deployment = ctx.deployer.deploy(&target, &files, &message).await?;

        ctx.emit_event(Event::TaskDeployed {
            task_id: run.task.id,
            repo_url: deployment.repo_url.clone(),
            pages_url: deployment.pages_url.clone(),
            commit_sha: deployment.commit_sha.clone(),
        });

        run.checks = Some(checks);
        run.deployment = Some(deployment.clone());
        Ok(deployment)
    }

    /// Short prose description of the code for the README. Optional.
    async fn explain(ctx: &ExecutorContext, run: &AgentRun) -> Option<String> {
        let request = GenerationRequest::new(
            OutputKind::Readme,
            PhasePrompts::explain(&run.task, &run.files),
        );
        match ctx.generate(&run.task, request).await {
            Ok(response) => Some(response.text.trim().to_string()),
            Err(e) => {
                warn!(task_id = %run.task.id, error = %e, "README explanation skipped");
                None
            }
        }
    }
}

fn commit_message(run: &AgentRun) -> String {
    let summary: String = run.task.brief.chars().take(50).collect();
    let summary = summary.trim();
    if run.task.is_update() {
        format!("Round {} update: {}", run.task.round, summary)
    } else {
        format!("Initial deployment: {}", summary)
    }
}
