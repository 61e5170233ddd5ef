//! Capability traits and the request/result types that flow through them

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

use crate::dom::{ElementIndex, ElementNode, Snapshot};
use crate::driver::{BrowserDriver, DriverError, ElementTarget};

use super::definition::{ActionSpec, ToolDescriptor};

pub type JsonMap = Map<String, JsonValue>;

/// One structured action chosen by the planner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub name: String,
    #[serde(default)]
    pub params: JsonMap,
}

impl ActionRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: JsonMap::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Build from a tool call; `None` when the arguments are not a JSON object
    pub fn from_value(name: impl Into<String>, input: JsonValue) -> Option<Self> {
        match input {
            JsonValue::Object(params) => Some(Self {
                name: name.into(),
                params,
            }),
            JsonValue::Null => Some(Self::new(name)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionErrorKind {
    Timeout,
    Tool,
    Browser,
}

/// Why an execution failed
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct ActionError {
    pub kind: ActionErrorKind,
    pub message: String,
}

impl ActionError {
    pub fn new(kind: ActionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ActionErrorKind::Timeout, message)
    }

    pub fn tool(message: impl Into<String>) -> Self {
        Self::new(ActionErrorKind::Tool, message)
    }

    pub fn browser(message: impl Into<String>) -> Self {
        Self::new(ActionErrorKind::Browser, message)
    }
}

impl From<DriverError> for ActionError {
    fn from(err: DriverError) -> Self {
        Self::browser(err.to_string())
    }
}

/// Outcome of one execution
#[derive(Debug, Clone)]
pub struct ActionResult {
    pub success: bool,
    pub observation: JsonValue,
    /// Fresh snapshot when the action changed the page
    pub snapshot: Option<Arc<Snapshot>>,
    pub error: Option<ActionError>,
    pub latency: Duration,
}

impl ActionResult {
    pub fn ok(observation: JsonValue, latency: Duration) -> Self {
        Self {
            success: true,
            observation,
            snapshot: None,
            error: None,
            latency,
        }
    }

    pub fn failed(error: ActionError, latency: Duration) -> Self {
        Self {
            success: false,
            observation: JsonValue::Null,
            snapshot: None,
            error: Some(error),
            latency,
        }
    }

    pub fn with_snapshot(mut self, snapshot: Arc<Snapshot>) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// Short text for feedback and summaries
    pub fn describe(&self) -> String {
        match &self.error {
            Some(err) => format!("failed ({})", err),
            None if self.observation.is_null() => "ok".to_string(),
            None => format!("ok: {}", self.observation),
        }
    }
}

/// What a local action can see while it runs
pub struct ActionPage<'a> {
    pub driver: &'a dyn BrowserDriver,
    pub snapshot: Option<&'a Snapshot>,
}

impl ActionPage<'_> {
    /// Resolve the element referenced by integer parameter `key`
    pub fn element(&self, params: &JsonMap, key: &str) -> Result<&ElementNode, ActionError> {
        let snapshot = self
            .snapshot
            .ok_or_else(|| ActionError::browser("no page snapshot available"))?;
        let index = param_u64(params, key)
            .ok_or_else(|| ActionError::browser(format!("missing element parameter '{}'", key)))?;
        let index = ElementIndex(index as u32);
        snapshot
            .node(index)
            .ok_or_else(|| ActionError::browser(format!("element {} not in snapshot", index)))
    }

    pub fn target(node: &ElementNode) -> ElementTarget {
        ElementTarget {
            frame_path: node.frame_path.clone(),
            locator: node.locator.clone(),
            index: node.index.0,
        }
    }
}

pub fn param_str<'a>(params: &'a JsonMap, key: &str) -> Option<&'a str> {
    params.get(key).and_then(JsonValue::as_str)
}

pub fn param_u64(params: &JsonMap, key: &str) -> Option<u64> {
    params.get(key).and_then(|v| {
        v.as_u64()
            .or_else(|| v.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
    })
}

pub fn param_i64(params: &JsonMap, key: &str) -> Option<i64> {
    params.get(key).and_then(|v| {
        v.as_i64()
            .or_else(|| v.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
    })
}

pub fn param_bool(params: &JsonMap, key: &str) -> Option<bool> {
    params.get(key).and_then(JsonValue::as_bool)
}

/// Action executed against the live browser page
#[async_trait]
pub trait BrowserAction: Send + Sync {
    fn spec(&self) -> &ActionSpec;

    /// Run with already-validated parameters
    async fn execute(&self, params: &JsonMap, page: ActionPage<'_>) -> Result<JsonValue, ActionError>;
}

/// Input handed to a remote tool
#[derive(Debug, Clone, Default)]
pub struct ToolInput {
    pub params: JsonMap,
    /// Set for tools that depend on the page
    pub page_url: Option<String>,
    /// PNG of the viewport, set for tools that depend on the page
    pub screenshot: Option<Vec<u8>>,
}

impl ToolInput {
    pub fn new(params: JsonMap) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool failed: {0}")]
    Failed(String),

    #[error("Tool transport error: {0}")]
    Transport(String),

    #[error("Invalid tool output: {0}")]
    InvalidOutput(String),
}

/// Asynchronous external capability (detector service, MCP tool)
#[async_trait]
pub trait RemoteTool: Send + Sync {
    fn describe(&self) -> ToolDescriptor;

    async fn invoke(&self, input: ToolInput) -> Result<JsonValue, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_kinds_serialize() {
        let kinds = [ActionErrorKind::Timeout, ActionErrorKind::Tool, ActionErrorKind::Browser];
        let names: Vec<JsonValue> = kinds.iter().map(|k| serde_json::to_value(k).unwrap()).collect();
        assert_eq!(names, vec![json!("timeout"), json!("tool"), json!("browser")]);
        assert!(serde_json::from_value::<ActionErrorKind>(json!("cancelled")).is_err());
    }

    #[test]
    fn test_request_from_value() {
        let req = ActionRequest::from_value("click", json!({"index": 4})).unwrap();
        assert_eq!(req.params["index"], 4);

        assert_eq!(ActionRequest::from_value("go_back", JsonValue::Null).unwrap().params.len(), 0);
        assert!(ActionRequest::from_value("click", json!("index=4")).is_none());
    }

    #[test]
    fn test_param_helpers() {
        let req = ActionRequest::new("scroll")
            .param("amount", 3.0)
            .param("offset", -2)
            .param("smooth", true)
            .param("direction", "down");

        assert_eq!(param_u64(&req.params, "amount"), Some(3));
        assert_eq!(param_u64(&req.params, "offset"), None);
        assert_eq!(param_i64(&req.params, "offset"), Some(-2));
        assert_eq!(param_bool(&req.params, "smooth"), Some(true));
        assert_eq!(param_str(&req.params, "direction"), Some("down"));
    }

    #[test]
    fn test_result_describe() {
        let ok = ActionResult::ok(json!({"clicked": 3}), Duration::from_millis(5));
        assert_eq!(ok.describe(), "ok: {\"clicked\":3}");

        let failed = ActionResult::failed(ActionError::timeout("detect exceeded 5s"), Duration::from_secs(5));
        assert!(!failed.success);
        assert_eq!(failed.describe(), "failed (Timeout: detect exceeded 5s)");
    }
}
