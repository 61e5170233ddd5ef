//! Planner boundary

use async_trait::async_trait;
use thiserror::Error;

use crate::context::ContextWindow;
use crate::llm::ToolDefinition;
use crate::tool::ActionRequest;

/// What the planner wants to do next
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerDecision {
    Act(ActionRequest),
    Complete { summary: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlannerError {
    #[error("Planner backend error: {0}")]
    Backend(String),

    /// The reply could not be turned into an action
    #[error("Malformed planner reply: {0}")]
    Malformed(String),

    #[error("Planner timed out")]
    Timeout,
}

/// Chooses one action per step from the catalog
#[async_trait]
pub trait Planner: Send + Sync {
    async fn next_action(
        &self,
        context: &ContextWindow,
        catalog: &[ToolDefinition],
    ) -> Result<PlannerDecision, PlannerError>;
}
