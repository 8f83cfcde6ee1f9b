//! Session facade over a single MCP server connection.

use std::collections::HashSet;
use std::time::Duration;

use serde_json::Value;

use crate::error::{McpError, Result};
use crate::protocol::{
    CallToolResult, InitializeParams, InitializeResult, ListToolsResult, MCP_PROTOCOL_VERSION,
    ServerInfo, ToolInfo,
};
use crate::transport::{
    DEFAULT_TIMEOUT, EventStreamTransport, HttpTransport, HttpTransportConfig, StdioTransport,
    StdioTransportConfig, Transport, TransportType,
};

/// Upper bound on pages fetched by [`McpClient::list_all_tools`].
pub const MAX_TOOL_PAGES: usize = 100;

/// Configuration for an MCP server connection.
#[derive(Debug, Clone)]
pub struct McpServerConfig {
    /// Unique name for this server.
    pub name: String,
    /// Transport type.
    pub transport: TransportType,
    /// Command to spawn (for stdio transport).
    pub command: String,
    /// URL for the server (for HTTP and SSE transports).
    pub url: Option<String>,
    /// Arguments to pass to the command.
    pub args: Vec<String>,
    /// Environment variables to set.
    pub env: Vec<(String, String)>,
    /// HTTP headers (for HTTP and SSE transports).
    pub headers: Vec<(String, String)>,
    /// Reply timeout; the transport default when `None`.
    pub timeout: Option<Duration>,
    /// Protocol version requested during initialize.
    pub protocol_version: String,
    /// Client name announced during initialize.
    pub client_name: Option<String>,
}

impl McpServerConfig {
    fn with_transport(name: impl Into<String>, transport: TransportType) -> Self {
        Self {
            name: name.into(),
            transport,
            command: String::new(),
            url: None,
            args: Vec::new(),
            env: Vec::new(),
            headers: Vec::new(),
            timeout: None,
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            client_name: None,
        }
    }

    /// Create a new server config for stdio transport.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::with_transport(name, TransportType::Stdio)
        }
    }

    /// Create a new server config for HTTP transport.
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::with_transport(name, TransportType::Http)
        }
    }

    /// Create a new server config for the event-stream transport.
    pub fn sse(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::with_transport(name, TransportType::Sse)
        }
    }

    /// Add arguments.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Add an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add environment variables.
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    /// Add an environment variable.
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Add an HTTP header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Set the reply timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the protocol version requested during initialize.
    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = version.into();
        self
    }

    /// Set the client name announced during initialize.
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    /// Check if this is an HTTP transport config.
    pub fn is_http(&self) -> bool {
        self.transport == TransportType::Http
    }

    /// Check if this is an event-stream transport config.
    pub fn is_sse(&self) -> bool {
        self.transport == TransportType::Sse
    }

    /// Check if this is a stdio transport config.
    pub fn is_stdio(&self) -> bool {
        self.transport == TransportType::Stdio
    }

    fn stdio_config(&self) -> StdioTransportConfig {
        StdioTransportConfig {
            command: self.command.clone(),
            args: self.args.clone(),
            env: self.env.clone(),
            timeout: Some(self.timeout.unwrap_or(DEFAULT_TIMEOUT)),
        }
    }

    fn http_config(&self) -> Result<HttpTransportConfig> {
        let url = self.url.as_ref().ok_or_else(|| {
            McpError::transport(
                "connect",
                format!("{} transport for '{}' requires a URL", self.transport, self.name),
            )
        })?;

        Ok(HttpTransportConfig {
            url: url.clone(),
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            headers: self.headers.clone(),
            protocol_version: self.protocol_version.clone(),
        })
    }

    fn initialize_params(&self) -> InitializeParams {
        let params = InitializeParams::new(&self.protocol_version);
        match &self.client_name {
            Some(name) => params.with_client_info(name, env!("CARGO_PKG_VERSION")),
            None => params,
        }
    }
}

/// An MCP client connected to a single MCP server.
///
/// Wraps one [`Transport`] and adds the session bookkeeping: the cached
/// initialize result, cursor-following tool listing and shutdown.
pub struct McpClient {
    /// Server configuration.
    config: McpServerConfig,
    /// Transport for communicating with the server.
    transport: Box<dyn Transport>,
    /// Handshake result (after initialization).
    init: Option<InitializeResult>,
}

impl McpClient {
    /// Connect to an MCP server using the configured transport.
    ///
    /// This does NOT initialize the connection - call `initialize()` after connecting.
    pub fn connect(config: McpServerConfig) -> Result<Self> {
        match config.transport {
            TransportType::Stdio => Self::connect_stdio(config),
            TransportType::Http => Self::connect_http(config),
            TransportType::Sse => Self::connect_sse(config),
        }
    }

    /// Connect to an MCP server using stdio transport.
    ///
    /// This spawns the server process but does NOT initialize the connection.
    pub fn connect_stdio(config: McpServerConfig) -> Result<Self> {
        let transport = StdioTransport::spawn(config.stdio_config())?;

        tracing::info!(
            server = %config.name,
            command = %config.command,
            "connected to MCP server via stdio"
        );

        Ok(Self::with_config(config, Box::new(transport)))
    }

    /// Connect to an MCP server using HTTP transport.
    pub fn connect_http(config: McpServerConfig) -> Result<Self> {
        let transport = HttpTransport::connect(config.http_config()?)?;

        tracing::info!(
            server = %config.name,
            url = %transport.url(),
            "connected to MCP server via HTTP"
        );

        Ok(Self::with_config(config, Box::new(transport)))
    }

    /// Connect to an MCP server using the event-stream transport.
    pub fn connect_sse(config: McpServerConfig) -> Result<Self> {
        let transport = EventStreamTransport::connect(config.http_config()?)?;

        tracing::info!(
            server = %config.name,
            url = %transport.url(),
            "connected to MCP server via SSE"
        );

        Ok(Self::with_config(config, Box::new(transport)))
    }

    /// Wrap an already-constructed transport.
    pub fn from_transport(name: impl Into<String>, transport: Box<dyn Transport>) -> Self {
        let config = McpServerConfig::with_transport(name, transport.kind());
        Self::with_config(config, transport)
    }

    fn with_config(config: McpServerConfig, transport: Box<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            init: None,
        }
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The wire mechanism in use.
    pub fn transport_type(&self) -> TransportType {
        self.transport.kind()
    }

    /// Get the server info (after initialization).
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.init.as_ref().map(|init| &init.server_info)
    }

    /// Check if the client has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.init.is_some()
    }

    /// Check if the session has been shut down.
    pub fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }

    /// Initialize the connection with the MCP server.
    ///
    /// Performs the handshake once; later calls return the cached result.
    pub fn initialize(&mut self) -> Result<&InitializeResult> {
        if self.init.is_none() {
            let result = self.transport.initialize(&self.config.initialize_params())?;

            tracing::info!(
                server = %self.config.name,
                name = %result.server_info.name,
                version = %result.server_info.version,
                protocol = %result.protocol_version,
                "MCP server initialized"
            );
            self.init = Some(result);
        }

        self.init
            .as_ref()
            .ok_or_else(|| McpError::decode("initialize result missing"))
    }

    fn note_uninitialized(&self, operation: &str) {
        if self.init.is_none() {
            tracing::debug!(
                server = %self.config.name,
                operation,
                "calling MCP server before initialize"
            );
        }
    }

    /// List available tools from the server (first page only).
    pub fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        Ok(self.list_tools_page(None)?.tools)
    }

    /// Fetch one page of the tool list.
    pub fn list_tools_page(&self, cursor: Option<&str>) -> Result<ListToolsResult> {
        self.note_uninitialized("tools/list");
        let page = self.transport.list_tools(cursor)?;

        tracing::debug!(
            server = %self.config.name,
            tool_count = page.tools.len(),
            has_more = page.next_cursor.is_some(),
            "listed MCP tools"
        );

        Ok(page)
    }

    /// List every tool, following `nextCursor` until the server stops
    /// returning one. A cursor seen twice ends the walk, as does reaching
    /// [`MAX_TOOL_PAGES`].
    pub fn list_all_tools(&self) -> Result<Vec<ToolInfo>> {
        let mut tools = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor: Option<String> = None;

        for pages in 1.. {
            let page = self.list_tools_page(cursor.as_deref())?;
            tools.extend(page.tools);

            let next = match page.next_cursor {
                Some(next) if !next.is_empty() => next,
                _ => break,
            };
            if !seen.insert(next.clone()) {
                tracing::warn!(
                    server = %self.config.name,
                    cursor = %next,
                    "server repeated a tool list cursor, stopping"
                );
                break;
            }
            if pages >= MAX_TOOL_PAGES {
                tracing::warn!(
                    server = %self.config.name,
                    pages,
                    "tool list exceeded the page limit, stopping"
                );
                break;
            }
            cursor = Some(next);
        }

        Ok(tools)
    }

    /// Call a tool on the server.
    ///
    /// A tool that reports failure (`isError`) still returns `Ok`; only
    /// transport and protocol failures are errors.
    pub fn call_tool(&self, name: &str, arguments: Option<Value>) -> Result<CallToolResult> {
        self.note_uninitialized("tools/call");
        let result = self.transport.call_tool(name, arguments)?;

        if result.is_error() {
            tracing::warn!(
                server = %self.config.name,
                tool = %name,
                "tool call returned error"
            );
        } else {
            tracing::debug!(
                server = %self.config.name,
                tool = %name,
                "tool call succeeded"
            );
        }

        Ok(result)
    }

    /// Shutdown the connection. Safe to call more than once.
    pub fn shutdown(&self) -> Result<()> {
        if self.transport.is_closed() {
            return Ok(());
        }
        tracing::info!(server = %self.config.name, "shutting down MCP client");
        self.transport.close()
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
