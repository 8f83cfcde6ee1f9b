//! TOML configuration for named MCP servers.
//!
//! ```toml
//! protocol_version = "2024-11-05"
//! client_name = "my-agent"
//!
//! [[servers]]
//! name = "sqlite"
//! command = "mcp-server-sqlite"
//! args = ["--db", "data.db"]
//! env = [["DEBUG", "1"]]
//!
//! [[servers]]
//! name = "remote"
//! transport = "sse"
//! url = "http://localhost:8080/mcp"
//! headers = [["Authorization", "Bearer token"]]
//! timeout_secs = 10
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::McpServerConfig;
use crate::transport::TransportType;

/// Result type for configuration loading.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while loading server configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Missing required field.
    #[error("missing required field '{field}' in {context}")]
    MissingField { field: String, context: String },

    /// No server with the requested name.
    #[error("no MCP server named '{0}' in config")]
    UnknownServer(String),
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    /// Protocol version requested from every server unless overridden.
    pub protocol_version: Option<String>,
    /// Client name announced during initialize.
    pub client_name: Option<String>,
    /// Configured servers.
    #[serde(default)]
    pub servers: Vec<ServerEntry>,
}

impl ClientConfig {
    /// Load config from a file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Load config from a file, or an empty config if it doesn't exist.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Parse config from a TOML string.
    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Look up a server entry by name.
    pub fn server(&self, name: &str) -> ConfigResult<&ServerEntry> {
        self.servers
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ConfigError::UnknownServer(name.to_string()))
    }

    /// Entries that are not disabled.
    pub fn enabled_servers(&self) -> impl Iterator<Item = &ServerEntry> {
        self.servers.iter().filter(|s| s.enabled)
    }

    /// Build a connection config for `name`, applying top-level defaults.
    pub fn server_config(&self, name: &str) -> ConfigResult<McpServerConfig> {
        let mut config = self.server(name)?.to_server_config()?;
        if let Some(version) = &self.protocol_version {
            config = config.with_protocol_version(version);
        }
        if let Some(client) = &self.client_name {
            config = config.with_client_name(client);
        }
        Ok(config)
    }
}

/// Configuration for a single MCP server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerEntry {
    /// Unique name for this server.
    pub name: String,
    /// Transport type. Defaults to stdio.
    #[serde(default)]
    pub transport: TransportType,
    /// Command to execute to start the server (for stdio transport).
    #[serde(default)]
    pub command: String,
    /// URL for the server (for HTTP and SSE transports).
    pub url: Option<String>,
    /// Arguments to pass to the command.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables to set (as [key, value] pairs).
    #[serde(default)]
    pub env: Vec<[String; 2]>,
    /// HTTP headers to set (as [key, value] pairs).
    #[serde(default)]
    pub headers: Vec<[String; 2]>,
    /// Reply timeout in seconds. Defaults to 30.
    pub timeout_secs: Option<u64>,
    /// Whether this server is enabled. Defaults to true.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

fn pairs(entries: &[[String; 2]]) -> Vec<(String, String)> {
    entries
        .iter()
        .map(|[k, v]| (k.clone(), v.clone()))
        .collect()
}

impl ServerEntry {
    /// Validate the entry and convert it to a connection config.
    pub fn to_server_config(&self) -> ConfigResult<McpServerConfig> {
        let context = || format!("server '{}'", self.name);

        let mut config = match self.transport {
            TransportType::Stdio => {
                if self.command.is_empty() {
                    return Err(ConfigError::MissingField {
                        field: "command".to_string(),
                        context: context(),
                    });
                }
                McpServerConfig::new(&self.name, &self.command)
                    .with_args(self.args.clone())
                    .with_env(pairs(&self.env))
            }
            TransportType::Http | TransportType::Sse => {
                let url = self.url.as_deref().ok_or_else(|| ConfigError::MissingField {
                    field: "url".to_string(),
                    context: context(),
                })?;
                let mut config = if self.transport == TransportType::Sse {
                    McpServerConfig::sse(&self.name, url)
                } else {
                    McpServerConfig::http(&self.name, url)
                };
                config.headers = pairs(&self.headers);
                config
            }
        };

        if let Some(secs) = self.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        Ok(config)
    }
}
