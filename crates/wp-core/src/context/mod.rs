//! Context management for planner calls

mod manager;
mod window;

pub use manager::{ContextManager, ContextOverflowError, DEFAULT_INSTRUCTIONS};
pub use window::{ContextMessage, ContextWindow, MessageKind, Role, estimate_tokens};
