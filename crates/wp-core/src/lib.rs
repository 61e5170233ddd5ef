//! wp-core: control loop for an LLM-driven browser agent
//!
//! Page model extraction, run history, the capability registry, context
//! window assembly and the orchestrator that ties them together. The
//! browser itself sits behind [`driver::BrowserDriver`].

pub mod agent;
pub mod config;
pub mod context;
pub mod dom;
pub mod driver;
pub mod error;
pub mod history;
pub mod llm;
pub mod tool;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use agent::{AgentState, CancelHandle, FailureReason, LlmPlanner, Orchestrator, Planner, RunOutcome, TaskSpec};
pub use config::{Config, LlmConfig, LlmProvider};
pub use context::{ContextManager, ContextWindow};
pub use dom::{ElementIndex, PageExtractor, Snapshot};
pub use driver::{BrowserDriver, DriverError, FramePath};
pub use error::{Error, Result};
pub use history::{HistoryStore, HistoryTracker};
pub use llm::{LlmClient, Message, MessageContent, ToolDefinition};
pub use tool::{ActionRequest, ActionResult, CapabilityRegistry, PageContext};
