//! Planner backed by an LLM with tool calling

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use tracing::debug;

use crate::context::ContextWindow;
use crate::llm::{LlmClient, Message, MessagesResponse, ToolDefinition};
use crate::tool::ActionRequest;

use super::planner::{Planner, PlannerDecision, PlannerError};

/// Name of the completion tool added to every catalog
pub const DONE_TOOL: &str = "done";

fn done_tool() -> ToolDefinition {
    ToolDefinition::new(
        DONE_TOOL,
        "Signal that the task is complete and report the result",
        json!({
            "type": "object",
            "properties": {
                "summary": {"type": "string", "description": "What was achieved"}
            },
            "required": ["summary"]
        }),
    )
}

pub struct LlmPlanner {
    client: LlmClient,
}

impl LlmPlanner {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }

    /// Interpret a model reply: the first tool call wins
    pub fn decide(response: &MessagesResponse) -> Result<PlannerDecision, PlannerError> {
        let Some((name, input)) = response.first_tool_use() else {
            let text = response.text();
            return Err(PlannerError::Malformed(if text.is_empty() {
                "reply contained no tool call".to_string()
            } else {
                format!("reply contained no tool call: {}", text)
            }));
        };

        if name == DONE_TOOL {
            let summary = input
                .get("summary")
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .to_string();
            return Ok(PlannerDecision::Complete { summary });
        }

        ActionRequest::from_value(name, input.clone())
            .map(PlannerDecision::Act)
            .ok_or_else(|| PlannerError::Malformed(format!("arguments for '{}' are not a JSON object", name)))
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn next_action(
        &self,
        context: &ContextWindow,
        catalog: &[ToolDefinition],
    ) -> Result<PlannerDecision, PlannerError> {
        let mut tools = catalog.to_vec();
        tools.push(done_tool());

        let request = self.client.request(
            Some(context.system_prompt()),
            vec![Message::user(context.user_prompt())],
            tools,
        );

        debug!(
            model = %self.client.model(),
            context_tokens = context.used(),
            catalog = catalog.len(),
            "Querying planner"
        );

        let response = self
            .client
            .messages(request)
            .await
            .map_err(|e| PlannerError::Backend(e.to_string()))?;

        Self::decide(&response)
    }
}
