//! MCP server list
//!
//! The list lives in its own file (JSON or TOML, chosen by extension) whose
//! path comes from `[mcp] config_path` or `MCP_CONFIG_PATH`.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use wp_core::{Error, Result};

/// One MCP server started as a child process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Used in logs and tool tags
    pub name: String,

    /// e.g. "uvx mcp-server-fetch" or "node /path/to/server.js"
    pub command: String,

    #[serde(default)]
    pub env: HashMap<String, String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl McpServerConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            env: HashMap::new(),
            enabled: true,
        }
    }

    /// Program and arguments of `command`
    pub fn program(&self) -> Result<(&str, Vec<&str>)> {
        let mut parts = self.command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| Error::Config(format!("MCP server '{}' has an empty command", self.name)))?;
        Ok((program, parts.collect()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpServers {
    #[serde(default)]
    pub servers: Vec<McpServerConfig>,
}

impl McpServers {
    /// Load a `.toml` file as TOML and anything else as JSON
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read MCP config {}: {}", path.display(), e)))?;

        if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&content).map_err(|e| Error::Config(format!("Invalid MCP config TOML: {}", e)))
        } else {
            serde_json::from_str(&content).map_err(|e| Error::Config(format!("Invalid MCP config JSON: {}", e)))
        }
    }

    pub fn enabled(&self) -> impl Iterator<Item = &McpServerConfig> {
        self.servers.iter().filter(|s| s.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"servers": [
                {{"name": "fetch", "command": "uvx mcp-server-fetch"}},
                {{"name": "old", "command": "node old.js", "enabled": false}}
            ]}}"#
        )
        .unwrap();

        let servers = McpServers::from_file(file.path()).unwrap();
        assert_eq!(servers.servers.len(), 2);
        let enabled: Vec<_> = servers.enabled().map(|s| s.name.as_str()).collect();
        assert_eq!(enabled, vec!["fetch"]);
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[[servers]]
name = "search"
command = "search-server --stdio"
env = {{ API_TOKEN = "abc" }}
"#
        )
        .unwrap();

        let servers = McpServers::from_file(file.path()).unwrap();
        assert_eq!(servers.servers[0].env["API_TOKEN"], "abc");
        assert!(servers.servers[0].enabled);
    }

    #[test]
    fn test_program() {
        let server = McpServerConfig::new("git", "uvx  mcp-server-git --repo .");
        let (program, args) = server.program().unwrap();
        assert_eq!(program, "uvx");
        assert_eq!(args, vec!["mcp-server-git", "--repo", "."]);

        assert!(McpServerConfig::new("empty", "  ").program().is_err());
    }

    #[test]
    fn test_invalid_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(McpServers::from_file(file.path()), Err(Error::Config(_))));
    }
}
