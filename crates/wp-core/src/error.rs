//! Error types for wp-core

use thiserror::Error;

use crate::agent::PlannerError;
use crate::context::ContextOverflowError;
use crate::dom::ExtractionError;
use crate::driver::DriverError;
use crate::tool::{RegistryError, ValidationError};

/// Main error type for wp-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("LLM API error: {0}")]
    LlmApi(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    ContextOverflow(#[from] ContextOverflowError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MCP error: {0}")]
    Mcp(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for wp-core
pub type Result<T> = std::result::Result<T, Error>;
