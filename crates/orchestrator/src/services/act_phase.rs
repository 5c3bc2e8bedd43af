use std::collections::BTreeMap;

use events::Event;
use llm::{GenerationRequest, OutputKind};
use tracing::{info, warn};

use crate::error::Result;
use crate::executor::PhaseResult;
use crate::linter::LintReport;
use crate::prompts::{PhasePrompts, DEVELOPER_SYSTEM};
use crate::services::executor_context::{AgentRun, ExecutorContext};
use crate::services::message_parser::{BuildPlan, MessageParser};

/// One generation attempt: a single LLM call, files written, linter run.
pub struct ActPhase;

impl ActPhase {
    pub async fn run(ctx: &ExecutorContext, run: &mut AgentRun) -> Result<PhaseResult> {
        let attempt = run.task.act_attempts + 1;
        info!(
            task_id = %run.task.id,
            attempt,
            max_attempts = ctx.config.max_act_attempts,
            "Starting ACT phase"
        );

        ctx.task_repo.record_act_attempt(run.task.id, attempt).await?;
        run.task.act_attempts = attempt;
        ctx.emit_event(Event::ActAttempt {
            task_id: run.task.id,
            attempt,
        });

        let prompt = match run.lint.as_ref().filter(|report| !report.passed) {
            Some(report) => PhasePrompts::fix(&run.task, &run.files, &report.output),
            None => {
                let fallback;
                let plan = match run.plan.as_ref() {
                    Some(plan) => plan,
                    None => {
                        fallback = BuildPlan::fallback();
                        &fallback
                    }
                };
                let existing = run
                    .previous
                    .as_ref()
                    .map(|p| p.files.as_slice())
                    .unwrap_or_default();
                PhasePrompts::site(&run.task, plan, &run.attachments, existing)
            }
        };

        let request =
            GenerationRequest::new(OutputKind::Site, prompt).with_system(DEVELOPER_SYSTEM);
        let response = ctx.generate(&run.task, request).await?;
        let generated = MessageParser::extract_site_files(&response.text);
        let has_index = generated.contains_key("index.html");

        let mut files = Self::base_files(run);
        files.extend(generated);
        for (path, content) in &files {
            run.workspace.write_file(path, content).await?;
        }

        let report = if has_index {
            ctx.linter.check(run.workspace.path()).await?
        } else {
            LintReport::failed("The response did not contain an index.html code block")
        };

        info!(
            task_id = %run.task.id,
            attempt,
            files = files.len(),
            linter = ctx.linter.name(),
            lint_passed = report.passed,
            "Act attempt finished"
        );
        if !report.passed {
            warn!(task_id = %run.task.id, attempt, output = %report.output, "Lint failed");
            ctx.emit_event(Event::LintFailed {
                task_id: run.task.id,
                attempt,
                output: report.output.clone(),
            });
        }

        let lint_passed = report.passed;
        run.files = files;
        run.lint = Some(report);

        Ok(PhaseResult::Generated {
            attempt,
            lint_passed,
        })
    }

    /// Files a response builds on: the previous attempt, else the previous round.
    fn base_files(run: &AgentRun) -> BTreeMap<String, String> {
        if !run.files.is_empty() {
            return run.files.clone();
        }
        run.previous
            .iter()
            .flat_map(|p| p.files.iter())
            .map(|f| (f.path.clone(), f.text()))
            .collect()
    }
}
