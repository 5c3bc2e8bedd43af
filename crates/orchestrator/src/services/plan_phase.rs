use llm::{GenerationRequest, OutputKind};
use tracing::info;

use crate::error::Result;
use crate::executor::PhaseResult;
use crate::prompts::{PhasePrompts, ARCHITECT_SYSTEM};
use crate::services::executor_context::{AgentRun, ExecutorContext};
use crate::services::message_parser::{MessageParser, SiteAnalysis};

pub struct PlanPhase;

impl PlanPhase {
    pub async fn run(ctx: &ExecutorContext, run: &mut AgentRun) -> Result<PhaseResult> {
        info!(task_id = %run.task.id, "Starting PLAN phase");

        let fallback;
        let analysis = match run.analysis.as_ref() {
            Some(analysis) => analysis,
            None => {
                fallback = SiteAnalysis::fallback(&run.task.checks);
                &fallback
            }
        };

        let request = GenerationRequest::new(
            OutputKind::Plan,
            PhasePrompts::plan(&run.task, analysis),
        )
        .with_system(ARCHITECT_SYSTEM);
        let response = ctx.generate(&run.task, request).await?;

        let plan = MessageParser::parse_plan(&response.text);
        let steps = plan.steps.len();
        info!(task_id = %run.task.id, steps, files = ?plan.files(), "Plan created");
        run.plan = Some(plan);

        Ok(PhaseResult::Planned { steps })
    }
}
