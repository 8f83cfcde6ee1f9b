//! Error types for MCP operations.
//!
//! Errors fall into two families callers care about: the wire worked but the
//! server rejected the operation ([`McpError::Protocol`]), or the exchange
//! itself failed (transport, timeout, decode, missing response).

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Result type for MCP operations.
pub type Result<T> = std::result::Result<T, McpError>;

/// Error type for MCP operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// Failed to serialize an outgoing request.
    #[error("failed to encode {method} request: {source}")]
    Encode {
        /// Method being encoded.
        method: String,
        /// Underlying serializer error.
        #[source]
        source: serde_json::Error,
    },

    /// Failed to spawn the MCP server process.
    #[error("failed to spawn MCP server: {0}")]
    SpawnFailed(String),

    /// The wire exchange failed (connection refused, broken pipe, unreadable body).
    #[error("transport error during {operation}: {message}")]
    Transport {
        /// Method that was in flight.
        operation: String,
        /// Description of the underlying cause.
        message: String,
    },

    /// No reply arrived within the configured timeout.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// Method that was in flight.
        operation: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The transport has already been closed.
    #[error("transport closed")]
    Closed,

    /// The peer returned bytes that are not a valid response envelope.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The server answered with a JSON-RPC error object.
    #[error("MCP error {code}: {message}{}", data_suffix(.data))]
    Protocol {
        /// Error code from the server.
        code: i64,
        /// Error message from the server.
        message: String,
        /// Optional additional data.
        data: Option<Value>,
    },

    /// The response id does not belong to the request that was sent.
    #[error("response id {actual} does not match request id {expected}")]
    IdMismatch {
        /// Id of the request in flight.
        expected: u64,
        /// Id carried by the response.
        actual: u64,
    },

    /// The stream or process ended before a usable response was assembled.
    #[error("no response received from {0}")]
    NoResponse(&'static str),
}

fn data_suffix(data: &Option<Value>) -> String {
    match data {
        Some(data) => format!(" (data: {data})"),
        None => String::new(),
    }
}

impl McpError {
    /// Create a spawn failed error.
    pub fn spawn_failed(msg: impl Into<String>) -> Self {
        Self::SpawnFailed(msg.into())
    }

    /// Create a transport error for the given operation.
    pub fn transport(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: msg.into(),
        }
    }

    /// Create a decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a protocol error from an error response.
    pub fn protocol(code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
            data,
        }
    }

    /// Whether the server delivered an error object (the network worked).
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    /// Whether the exchange itself failed before a response could be read.
    ///
    /// These are the errors a caller-side retry policy would consider.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::SpawnFailed(_)
                | Self::Transport { .. }
                | Self::Timeout { .. }
                | Self::Closed
                | Self::NoResponse(_)
        )
    }

    /// The server's error code, for protocol errors.
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Protocol { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = McpError::spawn_failed("command not found");
        assert!(err.to_string().contains("spawn"));
        assert!(err.to_string().contains("command not found"));

        let err = McpError::protocol(-32602, "Invalid parameters", None);
        assert_eq!(err.to_string(), "MCP error -32602: Invalid parameters");
    }

    #[test]
    fn test_protocol_error_includes_data() {
        let err = McpError::protocol(-32603, "boom", Some(serde_json::json!({"field": "path"})));
        let msg = err.to_string();
        assert!(msg.starts_with("MCP error -32603: boom"));
        assert!(msg.contains(r#"(data: {"field":"path"})"#));
    }

    #[test]
    fn test_no_response_message() {
        let err = McpError::NoResponse("SSE stream");
        assert_eq!(err.to_string(), "no response received from SSE stream");
    }

    #[test]
    fn test_transport_error_names_operation() {
        let err = McpError::transport("tools/call", "connection refused");
        let msg = err.to_string();
        assert!(msg.contains("tools/call"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_classification() {
        assert!(McpError::protocol(-1, "x", None).is_protocol());
        assert!(!McpError::protocol(-1, "x", None).is_transport());
        assert_eq!(McpError::protocol(-32601, "x", None).code(), Some(-32601));

        assert!(McpError::Closed.is_transport());
        assert!(McpError::NoResponse("server process").is_transport());
        assert!(
            McpError::Timeout {
                operation: "initialize".into(),
                timeout: Duration::from_secs(1),
            }
            .is_transport()
        );

        let decode = McpError::decode("not an object");
        assert!(!decode.is_transport());
        assert!(!decode.is_protocol());
        assert_eq!(decode.code(), None);
    }
}
