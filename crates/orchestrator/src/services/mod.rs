pub mod act_phase;
pub mod executor_context;
pub mod message_parser;
pub mod plan_phase;
pub mod review_phase;
pub mod think_phase;

pub use act_phase::ActPhase;
pub use executor_context::{AgentConfig, AgentRun, ExecutorContext, PreviousDeployment};
pub use message_parser::{BuildPlan, MessageParser, PlanStep, SiteAnalysis};
pub use plan_phase::PlanPhase;
pub use review_phase::ReviewPhase;
pub use think_phase::ThinkPhase;
