//! Connects configured MCP servers and registers their tools

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{info, warn};

use wp_core::config::McpConfig;
use wp_core::tool::{CapabilityRegistry, RegistryError};

use crate::adapter::{AdapterLimits, McpToolAdapter};
use crate::client::{McpCaller, McpClient, McpTool};
use crate::config::McpServers;

/// Connected MCP clients, kept alive for the duration of a run
pub struct McpRegistry {
    clients: Vec<Arc<McpClient>>,
}

impl McpRegistry {
    /// Connect every enabled server and register its tools.
    ///
    /// Servers that fail to start or list tools are skipped. Returns `None`
    /// when nothing connected.
    pub async fn initialize(
        servers: &McpServers,
        settings: &McpConfig,
        registry: &mut CapabilityRegistry,
    ) -> wp_core::Result<Option<Self>> {
        let enabled: Vec<_> = servers.enabled().collect();
        if enabled.is_empty() {
            info!("No MCP servers configured");
            return Ok(None);
        }

        let limits = AdapterLimits {
            timeout: Duration::from_secs(settings.tool_timeout_secs),
            concurrency: settings.tool_concurrency.max(1),
        };

        let connections = join_all(enabled.iter().map(|server| async move {
            info!(server_name = %server.name, command = %server.command, "Connecting to MCP server");
            let client = McpClient::connect(server).await?;
            let tools = client.list_tools().await?;
            Ok::<_, wp_core::Error>((client, tools))
        }))
        .await;

        let mut clients = Vec::new();
        let mut total_tools = 0;
        for (server, connection) in enabled.iter().zip(connections) {
            match connection {
                Ok((client, tools)) => {
                    let client = Arc::new(client);
                    info!(server_name = %server.name, tool_count = tools.len(), "Discovered MCP tools");
                    total_tools += register_tools(client.clone(), tools, limits, registry);
                    clients.push(client);
                }
                Err(e) => {
                    warn!(server_name = %server.name, error = %e, "Skipping MCP server");
                }
            }
        }

        if clients.is_empty() {
            warn!("No MCP servers connected successfully");
            return Ok(None);
        }

        info!(server_count = clients.len(), total_tools, "MCP registry initialized");
        Ok(Some(Self { clients }))
    }

    /// Load the server list from `settings.config_path`, then [`initialize`](Self::initialize)
    pub async fn from_settings(
        settings: &McpConfig,
        registry: &mut CapabilityRegistry,
    ) -> wp_core::Result<Option<Self>> {
        let path = match (&settings.config_path, settings.enabled) {
            (Some(path), true) => path,
            _ => {
                info!("MCP disabled or no server list configured");
                return Ok(None);
            }
        };

        info!(path = %path, "Loading MCP server list");
        let servers = McpServers::from_file(path)?;
        Self::initialize(&servers, settings, registry).await
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Close every connection that is no longer shared with a registered tool
    pub async fn shutdown(self) {
        info!("Shutting down MCP clients");

        for client in self.clients {
            match Arc::try_unwrap(client) {
                Ok(client) => {
                    if let Err(e) = client.shutdown().await {
                        warn!(error = %e, "Failed to shut down MCP client");
                    }
                }
                Err(client) => {
                    warn!(server_name = client.server_name(), "MCP client still in use, dropping it");
                }
            }
        }
    }
}

/// Register `tools` from one server; returns how many were accepted.
///
/// Names that collide with an existing capability are skipped.
pub fn register_tools(
    client: Arc<dyn McpCaller>,
    tools: Vec<McpTool>,
    limits: AdapterLimits,
    registry: &mut CapabilityRegistry,
) -> usize {
    let mut registered = 0;
    for tool in tools {
        let adapter = McpToolAdapter::new(client.clone(), tool, limits);
        let name = adapter.name().to_string();
        match registry.register_tool(Arc::new(adapter)) {
            Ok(()) => {
                info!(server_name = client.server_name(), tool_name = %name, "Registered MCP tool");
                registered += 1;
            }
            Err(e @ RegistryError::DuplicateCapability(_)) => {
                warn!(server_name = client.server_name(), tool_name = %name, error = %e, "MCP tool shadows an existing capability");
            }
            Err(e) => {
                warn!(server_name = client.server_name(), tool_name = %name, error = %e, "Rejected MCP tool");
            }
        }
    }
    registered
}
