//! wp-mcp: remote tools discovered from MCP servers
//!
//! Each enabled server is started as a child process, its tools are listed
//! once at start-up and every tool is registered with the capability
//! registry through [`McpToolAdapter`]. Input schemas become parameter specs,
//! so requests are validated before a call ever reaches the server.

pub mod adapter;
pub mod client;
pub mod config;
pub mod registry;

pub use adapter::{AdapterLimits, McpToolAdapter};
pub use client::{McpCallOutput, McpCaller, McpClient, McpTool};
pub use config::{McpServerConfig, McpServers};
pub use registry::{McpRegistry, register_tools};
