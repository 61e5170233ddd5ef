//! MCP client over a child-process transport

use async_trait::async_trait;
use rmcp::{
    model::{CallToolRequestParams, RawContent, Tool},
    service::{RoleClient, RunningService, ServiceExt},
    transport::{ConfigureCommandExt, TokioChildProcess},
};
use serde_json::Value as JsonValue;
use tokio::process::Command;
use tracing::debug;

use wp_core::{Error, Result};

use crate::config::McpServerConfig;

/// Tool as listed by a server
#[derive(Debug, Clone)]
pub struct McpTool {
    pub name: String,
    pub description: String,
    pub input_schema: JsonValue,
    /// `Null` when the server publishes none
    pub output_schema: JsonValue,
}

impl From<Tool> for McpTool {
    fn from(tool: Tool) -> Self {
        let raw = serde_json::to_value(&tool).unwrap_or(JsonValue::Null);
        Self {
            name: tool.name.to_string(),
            description: tool.description.clone().unwrap_or_default().to_string(),
            input_schema: serde_json::to_value(&tool.input_schema).unwrap_or(JsonValue::Null),
            output_schema: raw.get("outputSchema").cloned().unwrap_or(JsonValue::Null),
        }
    }
}

/// Result of one `tools/call`
#[derive(Debug, Clone, Default)]
pub struct McpCallOutput {
    /// Text content blocks joined by newlines
    pub text: String,
    pub structured: Option<JsonValue>,
    /// The server reported a tool-level failure
    pub is_error: bool,
}

/// Something that can run a named MCP tool
#[async_trait]
pub trait McpCaller: Send + Sync {
    fn server_name(&self) -> &str;

    fn server_version(&self) -> &str;

    async fn call_tool(&self, name: &str, args: JsonValue) -> Result<McpCallOutput>;
}

pub struct McpClient {
    service: RunningService<RoleClient, ()>,
    server_name: String,
    server_version: String,
}

impl McpClient {
    /// Start the server process and run the MCP handshake
    pub async fn connect(server: &McpServerConfig) -> Result<Self> {
        let (program, args) = server.program()?;

        let transport = TokioChildProcess::new(Command::new(program).configure(|c| {
            c.args(&args);
            c.envs(&server.env);
        }))
        .map_err(|e| Error::Mcp(format!("{}: failed to start server: {}", server.name, e)))?;

        let service = ()
            .serve(transport)
            .await
            .map_err(|e| Error::Mcp(format!("{}: handshake failed: {}", server.name, e)))?;

        let (server_name, server_version) = service
            .peer_info()
            .map(|info| (info.server_info.name.to_string(), info.server_info.version.to_string()))
            .unwrap_or_else(|| (server.name.clone(), "unknown".to_string()));

        debug!(server = %server_name, version = %server_version, "MCP handshake complete");
        Ok(Self {
            service,
            server_name,
            server_version,
        })
    }

    pub async fn list_tools(&self) -> Result<Vec<McpTool>> {
        let result = self
            .service
            .list_tools(Default::default())
            .await
            .map_err(|e| Error::Mcp(format!("Failed to list tools: {}", e)))?;

        Ok(result.tools.into_iter().map(McpTool::from).collect())
    }

    pub async fn shutdown(self) -> Result<()> {
        self.service
            .cancel()
            .await
            .map_err(|e| Error::Mcp(format!("Shutdown failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl McpCaller for McpClient {
    fn server_name(&self) -> &str {
        &self.server_name
    }

    fn server_version(&self) -> &str {
        &self.server_version
    }

    async fn call_tool(&self, name: &str, args: JsonValue) -> Result<McpCallOutput> {
        let result = self
            .service
            .call_tool(CallToolRequestParams {
                meta: None,
                name: name.to_string().into(),
                arguments: args.as_object().cloned(),
                task: None,
            })
            .await
            .map_err(|e| Error::Mcp(format!("Tool call failed: {}", e)))?;

        let text = result
            .content
            .into_iter()
            .filter_map(|c| match c.raw {
                RawContent::Text(text) => Some(text.text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        Ok(McpCallOutput {
            text,
            structured: result.structured_content,
            is_error: result.is_error.unwrap_or(false),
        })
    }
}
