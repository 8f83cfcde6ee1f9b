//! Buffered HTTP transport: one JSON POST per request, whole body read back.

use std::time::Duration;

use parking_lot::Mutex;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use url::Url;

use super::{DEFAULT_TIMEOUT, RequestIds, Transport, TransportType, snippet};
use crate::codec;
use crate::error::{McpError, Result};
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION};

/// Configuration for the HTTP-based transports.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// URL of the MCP endpoint.
    pub url: String,
    /// Request timeout, covering connect, send and body read.
    pub timeout: Duration,
    /// Extra headers sent with every request (e.g. authentication).
    pub headers: Vec<(String, String)>,
    /// Protocol version advertised in the `MCP-Protocol-Version` header (SSE only).
    pub protocol_version: String,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout: DEFAULT_TIMEOUT,
            headers: Vec::new(),
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
        }
    }
}

impl HttpTransportConfig {
    /// Create a new HTTP transport config with the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Set the advertised protocol version.
    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = version.into();
        self
    }

    pub(super) fn parse_url(&self) -> Result<Url> {
        let url = Url::parse(&self.url)
            .map_err(|e| McpError::transport("connect", format!("invalid URL '{}': {e}", self.url)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(McpError::transport(
                "connect",
                format!("invalid URL '{}': unsupported scheme '{other}'", self.url),
            )),
        }
    }
}

/// A reply read in full from the server.
pub(super) struct HttpReply {
    pub status: StatusCode,
    pub content_type: String,
    pub body: String,
}

impl HttpReply {
    /// Decode the body as a single JSON envelope.
    ///
    /// Error envelopes are honored even on non-2xx statuses; anything else on a
    /// failed status is a transport error.
    pub fn into_json_response(self, operation: &str) -> Result<JsonRpcResponse> {
        if self.status.is_success() {
            return codec::decode(self.body.as_bytes());
        }
        self.into_status_error(operation)
    }

    pub fn into_status_error(self, operation: &str) -> Result<JsonRpcResponse> {
        match codec::decode(self.body.as_bytes()) {
            Ok(response) if response.is_error() => Ok(response),
            _ => Err(McpError::transport(
                operation,
                format!("HTTP error {}: {}", self.status, snippet(&self.body)),
            )),
        }
    }
}

/// Pooled HTTP client plus endpoint, shared by both HTTP-based transports.
pub(super) struct HttpChannel {
    endpoint: Url,
    config: HttpTransportConfig,
    /// `None` once closed; dropping the client releases its pooled connections.
    client: Mutex<Option<reqwest::blocking::Client>>,
}

impl HttpChannel {
    pub fn open(config: HttpTransportConfig, endpoint: Url) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(5)
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                McpError::transport("connect", format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            endpoint,
            config,
            client: Mutex::new(Some(client)),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    /// POST `body` and read the complete reply.
    pub fn post(
        &self,
        request: &JsonRpcRequest,
        body: Vec<u8>,
        extra_headers: &[(&str, &str)],
    ) -> Result<HttpReply> {
        // Clone out of the lock so concurrent calls share the pool without serializing.
        let client = self.client.lock().clone().ok_or(McpError::Closed)?;

        tracing::trace!(
            url = %self.endpoint,
            id = request.id,
            json = %String::from_utf8_lossy(&body),
            "sending MCP HTTP request"
        );

        let mut req = client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        for (key, value) in extra_headers {
            req = req.header(*key, *value);
        }
        for (key, value) in &self.config.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        let resp = req.send().map_err(|e| self.request_error(&request.method, e))?;
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = resp
            .text()
            .map_err(|e| self.request_error(&request.method, e))?;

        tracing::trace!(
            status = %status,
            content_type = %content_type,
            json = %body,
            "received MCP HTTP response"
        );

        Ok(HttpReply {
            status,
            content_type,
            body,
        })
    }

    fn request_error(&self, operation: &str, err: reqwest::Error) -> McpError {
        if err.is_timeout() {
            McpError::Timeout {
                operation: operation.to_string(),
                timeout: self.config.timeout,
            }
        } else {
            McpError::transport(
                operation,
                format!("HTTP request to {} failed: {err}", self.endpoint),
            )
        }
    }

    /// Drop the pooled client. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        self.client.lock().take().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.client.lock().is_none()
    }
}

/// Buffered request/response transport over HTTP POST.
///
/// Safe to share across threads: the connection pool is thread-safe and the
/// only other state is the atomic request-id sequence.
pub struct HttpTransport {
    channel: HttpChannel,
    ids: RequestIds,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    ///
    /// Validates the URL and builds the connection pool; no request is sent.
    pub fn connect(config: HttpTransportConfig) -> Result<Self> {
        let endpoint = config.parse_url()?;
        let channel = HttpChannel::open(config, endpoint)?;

        tracing::info!(
            url = %channel.endpoint(),
            timeout_secs = channel.config().timeout.as_secs(),
            "created HTTP transport"
        );

        Ok(Self {
            channel,
            ids: RequestIds::new(),
        })
    }

    /// The endpoint requests are posted to.
    pub fn url(&self) -> &Url {
        self.channel.endpoint()
    }
}

impl Transport for HttpTransport {
    fn kind(&self) -> TransportType {
        TransportType::Http
    }

    fn next_request_id(&self) -> u64 {
        self.ids.next()
    }

    fn exchange(&self, request: &JsonRpcRequest, body: Vec<u8>) -> Result<JsonRpcResponse> {
        let reply = self.channel.post(request, body, &[])?;
        reply.into_json_response(&request.method)
    }

    fn close(&self) -> Result<()> {
        if self.channel.close() {
            tracing::debug!(url = %self.channel.endpoint(), "closed HTTP transport");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_transport_config() {
        let config = HttpTransportConfig::new("http://localhost:8080/mcp")
            .with_timeout(Duration::from_secs(60))
            .with_header("Authorization", "Bearer token123")
            .with_protocol_version("2025-03-26");

        assert_eq!(config.url, "http://localhost:8080/mcp");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.protocol_version, "2025-03-26");
        assert_eq!(
            config.headers,
            vec![("Authorization".to_string(), "Bearer token123".to_string())]
        );
    }

    #[test]
    fn test_http_transport_config_default() {
        let config = HttpTransportConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.protocol_version, MCP_PROTOCOL_VERSION);
        assert!(config.headers.is_empty());
    }

    #[test]
    fn test_http_transport_creation() {
        let transport =
            HttpTransport::connect(HttpTransportConfig::new("http://localhost:8080/mcp")).unwrap();
        assert_eq!(transport.kind(), TransportType::Http);
        assert_eq!(transport.url().path(), "/mcp");
        assert!(!transport.is_closed());
    }

    #[test]
    fn test_http_transport_invalid_url() {
        for url in ["not a valid url", "ftp://example.com/mcp"] {
            match HttpTransport::connect(HttpTransportConfig::new(url)) {
                Err(McpError::Transport { message, .. }) => assert!(message.contains("invalid URL")),
                Err(other) => panic!("expected transport error, got {other}"),
                Ok(_) => panic!("expected {url} to be rejected"),
            }
        }
    }

    #[test]
    fn test_close_is_idempotent() {
        let transport =
            HttpTransport::connect(HttpTransportConfig::new("http://localhost:8080/mcp")).unwrap();
        assert!(transport.close().is_ok());
        assert!(transport.close().is_ok());
        assert!(transport.is_closed());
        assert!(matches!(transport.list_tools(None), Err(McpError::Closed)));
    }

    #[test]
    fn test_status_error_prefers_error_envelope() {
        let reply = HttpReply {
            status: StatusCode::BAD_REQUEST,
            content_type: "application/json".into(),
            body: r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32600,"message":"bad"}}"#.into(),
        };
        let response = reply.into_json_response("initialize").unwrap();
        assert!(response.is_error());

        let reply = HttpReply {
            status: StatusCode::BAD_GATEWAY,
            content_type: "text/html".into(),
            body: "<html>upstream down</html>".into(),
        };
        match reply.into_json_response("initialize") {
            Err(McpError::Transport { operation, message }) => {
                assert_eq!(operation, "initialize");
                assert!(message.contains("502"));
                assert!(message.contains("upstream down"));
            }
            other => panic!("expected transport error, got {other:?}"),
        }
    }
}
