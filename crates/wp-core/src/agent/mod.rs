//! Agent loop: planner boundary, run state and the orchestrator

mod llm_planner;
mod orchestrator;
mod planner;
mod state;

pub use llm_planner::{DONE_TOOL, LlmPlanner};
pub use orchestrator::Orchestrator;
pub use planner::{Planner, PlannerDecision, PlannerError};
pub use state::{AgentState, CancelHandle, FailureReason, RunOutcome, SuccessPredicate, TaskSpec};
