//! Exposes one MCP tool as a registry [`RemoteTool`]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use tracing::debug;

use wp_core::tool::{RemoteTool, ToolDescriptor, ToolError, ToolInput, params_from_schema};

use crate::client::{McpCaller, McpTool};

/// Per-tool limits applied to every adapted tool
#[derive(Debug, Clone, Copy)]
pub struct AdapterLimits {
    pub timeout: Duration,
    pub concurrency: usize,
}

pub struct McpToolAdapter {
    client: Arc<dyn McpCaller>,
    tool_name: String,
    descriptor: ToolDescriptor,
}

impl McpToolAdapter {
    pub fn new(client: Arc<dyn McpCaller>, tool: McpTool, limits: AdapterLimits) -> Self {
        let mut descriptor = ToolDescriptor::new(tool.name.clone(), tool.description)
            .timeout(limits.timeout)
            .concurrency_limit(limits.concurrency)
            .version(client.server_version())
            .tag("mcp")
            .tag(client.server_name());
        descriptor.input = params_from_schema(&tool.input_schema);
        if !tool.output_schema.is_null() {
            descriptor = descriptor.output_schema(tool.output_schema);
        }

        Self {
            client,
            tool_name: tool.name,
            descriptor,
        }
    }

    pub fn name(&self) -> &str {
        &self.tool_name
    }
}

#[async_trait]
impl RemoteTool for McpToolAdapter {
    fn describe(&self) -> ToolDescriptor {
        self.descriptor.clone()
    }

    /// Structured content wins over text; text that parses as JSON is kept as JSON
    async fn invoke(&self, input: ToolInput) -> Result<JsonValue, ToolError> {
        let output = self
            .client
            .call_tool(&self.tool_name, JsonValue::Object(input.params))
            .await
            .map_err(|e| ToolError::Transport(e.to_string()))?;

        if output.is_error {
            return Err(ToolError::Failed(output.text));
        }

        let result = output
            .structured
            .or_else(|| serde_json::from_str::<JsonValue>(&output.text).ok().filter(JsonValue::is_object))
            .unwrap_or(JsonValue::String(output.text));

        debug!(tool = %self.tool_name, server = self.client.server_name(), "MCP tool returned");
        Ok(json!({
            "success": true,
            "result": result,
            "error": null,
            "metadata": {
                "server": self.client.server_name(),
                "version": self.client.server_version(),
                "tool": self.tool_name,
            }
        }))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use wp_core::config::ExtractorConfig;
    use wp_core::dom::PageExtractor;
    use wp_core::testing::{FakeDriver, FakePage};
    use wp_core::tool::{ActionRequest, CapabilityRegistry, PageContext, ParamKind};
    use wp_core::{Error, Result};

    use crate::client::McpCallOutput;

    /// Replays canned outputs and records calls
    pub(crate) struct FakeServer {
        pub output: McpCallOutput,
        pub calls: Mutex<Vec<(String, JsonValue)>>,
        pub broken: bool,
    }

    impl FakeServer {
        pub fn replying(output: McpCallOutput) -> Arc<Self> {
            Arc::new(Self {
                output,
                calls: Mutex::new(Vec::new()),
                broken: false,
            })
        }
    }

    #[async_trait]
    impl McpCaller for FakeServer {
        fn server_name(&self) -> &str {
            "fake"
        }

        fn server_version(&self) -> &str {
            "0.3.1"
        }

        async fn call_tool(&self, name: &str, args: JsonValue) -> Result<McpCallOutput> {
            self.calls.lock().unwrap().push((name.to_string(), args));
            if self.broken {
                return Err(Error::Mcp("pipe closed".to_string()));
            }
            Ok(self.output.clone())
        }
    }

    pub(crate) fn weather_tool() -> McpTool {
        McpTool {
            name: "get_forecast".to_string(),
            description: "Forecast for a city".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "city": {"type": "string", "description": "City name"},
                    "days": {"type": "integer"},
                    "filters": {"type": "object"}
                },
                "required": ["city"]
            }),
            output_schema: JsonValue::Null,
        }
    }

    fn limits() -> AdapterLimits {
        AdapterLimits {
            timeout: Duration::from_secs(5),
            concurrency: 2,
        }
    }

    #[test]
    fn test_descriptor_from_schema() {
        let adapter = McpToolAdapter::new(FakeServer::replying(McpCallOutput::default()), weather_tool(), limits());
        let descriptor = adapter.describe();

        assert_eq!(descriptor.name, "get_forecast");
        assert_eq!(descriptor.version, "0.3.1");
        assert_eq!(descriptor.tags, vec!["mcp".to_string(), "fake".to_string()]);
        assert_eq!(descriptor.concurrency_limit, 2);

        let city = descriptor.input.iter().find(|p| p.name == "city").unwrap();
        assert!(city.required);
        let filters = descriptor.input.iter().find(|p| p.name == "filters").unwrap();
        assert_eq!(filters.kind, ParamKind::Json);
        assert!(!filters.required);
    }

    #[tokio::test]
    async fn test_structured_result() {
        let server = FakeServer::replying(McpCallOutput {
            text: r#"{"high": 21}"#.to_string(),
            structured: None,
            is_error: false,
        });
        let adapter = McpToolAdapter::new(server.clone(), weather_tool(), limits());

        let mut params = serde_json::Map::new();
        params.insert("city".to_string(), json!("Lyon"));
        let value = adapter.invoke(ToolInput::new(params)).await.unwrap();

        assert_eq!(value["success"], true);
        assert_eq!(value["result"]["high"], 21);
        assert_eq!(value["metadata"]["server"], "fake");
        assert_eq!(server.calls.lock().unwrap()[0].1, json!({"city": "Lyon"}));
    }

    #[tokio::test]
    async fn test_tool_error_fails_invocation() {
        let server = FakeServer::replying(McpCallOutput {
            text: "city not found".to_string(),
            structured: None,
            is_error: true,
        });
        let adapter = McpToolAdapter::new(server, weather_tool(), limits());

        let err = adapter.invoke(ToolInput::default()).await.unwrap_err();
        assert!(matches!(err, ToolError::Failed(ref m) if m == "city not found"));
    }

    #[tokio::test]
    async fn test_invoked_through_registry() {
        let server = FakeServer::replying(McpCallOutput {
            text: "Sunny".to_string(),
            structured: None,
            is_error: false,
        });
        let mut registry = CapabilityRegistry::new();
        registry
            .register_tool(Arc::new(McpToolAdapter::new(server.clone(), weather_tool(), limits())))
            .unwrap();

        let driver = Arc::new(FakeDriver::new(FakePage::new("https://test.local/", "Test")));
        let mut page = PageContext::new(driver, PageExtractor::new(ExtractorConfig::default()));

        let err = registry
            .invoke(&ActionRequest::new("get_forecast").param("days", 2), &mut page)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("city"));
        assert!(server.calls.lock().unwrap().is_empty());

        let result = registry
            .invoke(&ActionRequest::new("get_forecast").param("city", "Oslo"), &mut page)
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.observation["result"], "Sunny");
    }
}
