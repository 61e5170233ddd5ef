//! Configuration management
//!
//! Settings are resolved in this order:
//! 1. Environment variables
//! 2. `webpilot.toml` configuration file
//! 3. Defaults
//!
//! `${VAR_NAME}` inside the configuration file is replaced by the
//! environment variable's value before parsing.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Error;

/// Default configuration file name looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "webpilot.toml";

/// LLM Provider type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Anthropic Messages API
    #[default]
    Claude,
    /// OpenAI-compatible API
    #[serde(alias = "openai", alias = "glm", alias = "zai")]
    OpenAi,
}

impl LlmProvider {
    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "openai" | "glm" | "zai" | "minimax" => LlmProvider::OpenAi,
            _ => LlmProvider::Claude,
        }
    }
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub provider: LlmProvider,
    /// Base URL (optional, for custom endpoints)
    pub base_url: Option<String>,
    pub max_tokens: u64,
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "claude-sonnet-4-20250514".to_string(),
            provider: LlmProvider::Claude,
            base_url: None,
            max_tokens: 1024,
            request_timeout_secs: 120,
        }
    }
}

/// Browser launch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub width: u32,
    pub height: u32,
    pub navigation_timeout_secs: u64,
    /// Upper bound for a single local browser action
    pub action_timeout_secs: u64,
    pub enable_gpu: bool,
    pub user_agent: Option<String>,
    /// Make cross-origin iframe documents reachable from the page
    pub disable_site_isolation: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            width: 1280,
            height: 1100,
            navigation_timeout_secs: 30,
            action_timeout_secs: 15,
            enable_gpu: false,
            user_agent: None,
            disable_site_isolation: true,
        }
    }
}

impl BrowserConfig {
    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }
}

/// Step loop limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_steps: u32,
    pub wall_clock_secs: u64,
    pub max_consecutive_failures: u32,
    pub max_malformed_requests: u32,
    pub planner_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 50,
            wall_clock_secs: 600,
            max_consecutive_failures: 3,
            max_malformed_requests: 3,
            planner_timeout_secs: 90,
        }
    }
}

impl AgentConfig {
    pub fn wall_clock(&self) -> Duration {
        Duration::from_secs(self.wall_clock_secs)
    }

    pub fn planner_timeout(&self) -> Duration {
        Duration::from_secs(self.planner_timeout_secs)
    }
}

/// Page model extraction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub query_timeout_secs: u64,
    pub max_nodes: usize,
    pub max_frame_depth: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 250,
            query_timeout_secs: 10,
            max_nodes: 2000,
            max_frame_depth: 4,
        }
    }
}

impl ExtractorConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

/// Planner context budget
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub token_budget: usize,
    /// Fraction of the budget above which older history is condensed
    pub summarization_threshold: f32,
    /// Maximum characters of element text rendered per element
    pub max_element_text: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_budget: 32_000,
            summarization_threshold: 0.8,
            max_element_text: 80,
        }
    }
}

/// Remote image detector settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// HTTP endpoint of the detection service; the tool is not registered when unset
    pub endpoint: Option<String>,
    pub confidence_threshold: f64,
    pub timeout_secs: u64,
    pub concurrency_limit: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            confidence_threshold: 0.25,
            timeout_secs: 30,
            concurrency_limit: 2,
        }
    }
}

/// MCP tool discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    /// Path to MCP server list (JSON format)
    pub config_path: Option<String>,
    pub enabled: bool,
    pub tool_timeout_secs: u64,
    pub tool_concurrency: usize,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            enabled: true,
            tool_timeout_secs: 60,
            tool_concurrency: 1,
        }
    }
}

/// Run history persistence
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HistoryConfig {
    /// SQLite file; history is kept in memory only when unset
    pub db_path: Option<String>,
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub browser: BrowserConfig,
    pub agent: AgentConfig,
    pub extractor: ExtractorConfig,
    pub context: ContextConfig,
    pub detector: DetectorConfig,
    pub mcp: McpConfig,
    pub history: HistoryConfig,
}

impl Config {
    /// Replace `${VAR_NAME}` with the variable's value (empty when unset)
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::with_capacity(value.len());
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides();

        debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Parse configuration from TOML text (after `${VAR}` expansion)
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let expanded = Self::expand_env_vars(content);
        toml::from_str(&expanded).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load configuration from the default location
    ///
    /// Reads `.env` first, then `./webpilot.toml` when present; otherwise
    /// falls back to environment variables only.
    pub fn load() -> crate::Result<Self> {
        dotenvy::dotenv().ok();

        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::from_toml_file(DEFAULT_CONFIG_FILE);
        }

        Self::from_env()
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();
        config.apply_env_overrides();

        if config.llm.api_key.is_empty() {
            return Err(Error::Config("LLM_API_KEY not set".to_string()));
        }

        Ok(config)
    }

    /// Overwrite settings with environment variables that are set and non-empty
    fn apply_env_overrides(&mut self) {
        fn var(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.is_empty())
        }

        if let Some(api_key) = var("LLM_API_KEY") {
            self.llm.api_key = api_key;
        }
        if let Some(model) = var("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(provider) = var("LLM_PROVIDER") {
            self.llm.provider = LlmProvider::parse(&provider);
        }
        if let Some(base_url) = var("LLM_BASE_URL") {
            self.llm.base_url = Some(base_url);
        }

        if let Some(headless) = var("WEBPILOT_HEADLESS") {
            self.browser.headless = headless.to_lowercase() != "false";
        }
        if let Some(steps) = var("WEBPILOT_MAX_STEPS").and_then(|s| s.parse().ok()) {
            self.agent.max_steps = steps;
        }
        if let Some(budget) = var("WEBPILOT_TOKEN_BUDGET").and_then(|s| s.parse().ok()) {
            self.context.token_budget = budget;
        }

        if let Some(endpoint) = var("DETECTOR_URL") {
            self.detector.endpoint = Some(endpoint);
        }

        if let Some(path) = var("MCP_CONFIG_PATH") {
            self.mcp.config_path = Some(path);
        }
        if let Some(enabled) = var("MCP_ENABLED") {
            self.mcp.enabled = enabled.to_lowercase() != "false";
        }

        if let Some(path) = var("HISTORY_DB") {
            self.history.db_path = Some(path);
        }
    }
}
