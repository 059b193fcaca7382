//! MCP (Model Context Protocol) server registry, grounded in
//! `athena_ai/mcp/manager.py`.
//!
//! Sibling to [`crate::credentials`]: where the credential store resolves
//! `@variable` references, this module resolves the `@mcp <server>
//! <remaining>` prefix a user can put on a free-text request into a
//! `(server, remaining)` pair plus that server's stdio launch config.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_config_path() -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    home.join(".merlya").join("mcp_servers.json")
}

/// Persistent store of MCP server configurations, one JSON file at
/// `~/.merlya/mcp_servers.json` mirroring the original's per-user config.
pub struct McpManager {
    config_path: PathBuf,
    servers: Mutex<HashMap<String, McpServerConfig>>,
}

impl McpManager {
    pub fn new() -> Self {
        Self::with_config_path(default_config_path())
    }

    pub fn with_config_path(config_path: PathBuf) -> Self {
        let servers = load_servers(&config_path);
        Self {
            config_path,
            servers: Mutex::new(servers),
        }
    }

    pub fn add_server(&self, name: impl Into<String>, config: McpServerConfig) -> bool {
        if config.kind == "stdio" && config.command.is_empty() {
            tracing::error!("stdio MCP server must have a command");
            return false;
        }
        let name = name.into();
        self.servers.lock().insert(name.clone(), config);
        self.save();
        tracing::info!(server = %name, "added MCP server");
        true
    }

    pub fn delete_server(&self, name: &str) -> bool {
        let removed = self.servers.lock().remove(name).is_some();
        if removed {
            self.save();
            tracing::info!(server = name, "deleted MCP server");
        } else {
            tracing::warn!(server = name, "MCP server not found");
        }
        removed
    }

    pub fn get_server(&self, name: &str) -> Option<McpServerConfig> {
        self.servers.lock().get(name).cloned()
    }

    pub fn list_servers(&self) -> HashMap<String, McpServerConfig> {
        self.servers.lock().clone()
    }

    fn save(&self) {
        if let Some(parent) = self.config_path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                tracing::error!(error = %err, "failed to create MCP config directory");
                return;
            }
        }
        let servers = self.servers.lock();
        match serde_json::to_string_pretty(&*servers) {
            Ok(body) => {
                if let Err(err) = std::fs::write(&self.config_path, body) {
                    tracing::error!(error = %err, "failed to save MCP server configs");
                }
            }
            Err(err) => tracing::error!(error = %err, "failed to serialize MCP server configs"),
        }
    }
}

impl Default for McpManager {
    fn default() -> Self {
        Self::new()
    }
}

fn load_servers(path: &Path) -> HashMap<String, McpServerConfig> {
    if !path.exists() {
        tracing::debug!("no MCP server configs found, starting fresh");
        return HashMap::new();
    }
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(servers) => servers,
            Err(err) => {
                tracing::error!(error = %err, "failed to parse MCP server configs");
                HashMap::new()
            }
        },
        Err(err) => {
            tracing::error!(error = %err, "failed to load MCP server configs");
            HashMap::new()
        }
    }
}

/// Parses a leading `@mcp <server> <remaining>` reference off `query`.
/// Returns `None` if `query` doesn't start with `@mcp`.
pub fn parse_mcp_reference(query: &str) -> Option<(String, String)> {
    let trimmed = query.trim();
    let rest = trimmed.strip_prefix("@mcp")?;
    let rest = rest.trim_start();
    if rest.is_empty() {
        return None;
    }
    let mut parts = rest.splitn(2, char::is_whitespace);
    let server = parts.next()?.to_string();
    let remaining = parts.next().unwrap_or("").trim_start().to_string();
    Some((server, remaining))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_server_and_remaining_query() {
        assert_eq!(
            parse_mcp_reference("@mcp filesystem list files in /tmp"),
            Some(("filesystem".to_string(), "list files in /tmp".to_string()))
        );
        assert_eq!(parse_mcp_reference("@mcp git"), Some(("git".to_string(), String::new())));
        assert_eq!(parse_mcp_reference("normal query"), None);
        assert_eq!(parse_mcp_reference("@mcp"), None);
    }

    #[test]
    fn add_and_list_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = McpManager::with_config_path(dir.path().join("mcp_servers.json"));
        let config = McpServerConfig {
            kind: "stdio".to_string(),
            command: "npx".to_string(),
            args: vec!["-y".to_string(), "@modelcontextprotocol/server-git".to_string()],
            env: HashMap::new(),
        };
        assert!(manager.add_server("git", config));
        assert_eq!(manager.list_servers().len(), 1);
        assert!(manager.get_server("git").is_some());
        assert!(manager.delete_server("git"));
        assert!(manager.get_server("git").is_none());
    }

    #[test]
    fn rejects_stdio_server_without_command() {
        let dir = tempfile::tempdir().unwrap();
        let manager = McpManager::with_config_path(dir.path().join("mcp_servers.json"));
        let config = McpServerConfig {
            kind: "stdio".to_string(),
            command: String::new(),
            args: vec![],
            env: HashMap::new(),
        };
        assert!(!manager.add_server("bad", config));
    }
}
