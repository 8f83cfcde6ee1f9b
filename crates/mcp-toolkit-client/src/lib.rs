//! MCP (Model Context Protocol) client.
//!
//! Connects to an MCP server over one of three wire mechanisms, performs the
//! `initialize` handshake and lists and invokes the server's tools.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  McpClient                                                  │
//! │  - Caches the initialize result                             │
//! │  - Follows tool list cursors, closes on drop                │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  dyn Transport                                              │
//! │  - initialize / list_tools / call_tool                      │
//! │  - Request ids, id correlation, error mapping               │
//! └─────────────────────────────────────────────────────────────┘
//!         │                     │                      │
//!         ▼                     ▼                      ▼
//!   HttpTransport      EventStreamTransport      StdioTransport
//!   (JSON POST)        (POST, JSON or SSE)       (child process,
//!                                                 one JSON per line)
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use mcp_toolkit_client::{McpClient, McpServerConfig};
//!
//! let config = McpServerConfig::new("sqlite", "mcp-server-sqlite")
//!     .with_arg("--db")
//!     .with_arg("/path/to/database.db");
//!
//! let mut client = McpClient::connect(config)?;
//! let init = client.initialize()?;
//! println!("Connected to: {} v{}", init.server_info.name, init.server_info.version);
//!
//! for tool in client.list_all_tools()? {
//!     println!("Tool: {} - {:?}", tool.name, tool.description);
//! }
//!
//! let result = client.call_tool("query", Some(json!({"sql": "SELECT * FROM users"})))?;
//! println!("Result: {:?}", result.text());
//! client.shutdown()?;
//! ```
//!
//! # MCP Protocol
//!
//! Every message is a JSON-RPC 2.0 envelope:
//!
//! ```text
//! {"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"echo","arguments":{...}}}
//! {"jsonrpc":"2.0","id":1,"result":{"content":[{"type":"text","text":"..."}]}}
//! ```
//!
//! The library emits `tracing` events but never installs a subscriber.

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod sse;
pub mod transport;

// Re-export main types
pub use client::{MAX_TOOL_PAGES, McpClient, McpServerConfig};
pub use config::{ClientConfig, ConfigError, ServerEntry};
pub use error::{McpError, Result};
pub use protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, InputSchema,
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, ListToolsResult, MCP_PROTOCOL_VERSION, Method,
    ServerCapabilities, ServerInfo, ToolContent, ToolInfo, ToolsCapability,
};
pub use transport::{
    EventStreamTransport, HttpTransport, HttpTransportConfig, StdioTransport,
    StdioTransportConfig, Transport, TransportType,
};
