//! LLM API client and types
//!
//! Supports both the Anthropic Messages API and OpenAI-compatible APIs.

mod client;
mod types;

pub use client::LlmClient;
pub use types::*;
