//! Transport layer for MCP communication.
//!
//! Three wire mechanisms implement the same [`Transport`] contract:
//!
//! - [`HttpTransport`]: one buffered JSON POST per call
//! - [`EventStreamTransport`]: POST whose reply may be JSON or an SSE stream
//! - [`StdioTransport`]: newline-delimited JSON over a child process's pipes
//!
//! Every transport processes one request to completion before the next, so
//! the reply read after a request is the reply to that request. The id is
//! still checked and a mismatch is reported as [`McpError::IdMismatch`].

mod event_stream;
mod http;
mod stdio;

pub use event_stream::EventStreamTransport;
pub use http::{HttpTransport, HttpTransportConfig};
pub use stdio::{StdioTransport, StdioTransportConfig};

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec;
use crate::error::{McpError, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcRequest,
    JsonRpcResponse, ListToolsParams, ListToolsResult, Method,
};

/// Default time to wait for a reply on any transport.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport type for MCP server connections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    /// Stdio transport - spawns a child process.
    #[default]
    Stdio,
    /// HTTP transport - one JSON POST per request.
    Http,
    /// Event-stream transport - POST answered with JSON or SSE.
    Sse,
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Stdio => "stdio",
            Self::Http => "http",
            Self::Sse => "sse",
        })
    }
}

/// Monotonic request-id sequence owned by one transport instance.
#[derive(Debug)]
pub struct RequestIds(AtomicU64);

impl RequestIds {
    /// Start a sequence at 1.
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    /// Take the next id. Never returns the same value twice.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for RequestIds {
    fn default() -> Self {
        Self::new()
    }
}

/// The uniform call contract over every wire mechanism.
///
/// Implementors provide the raw exchange; the operations themselves
/// (`initialize`, `list_tools`, `call_tool`) are shared so encoding,
/// correlation and error mapping behave identically on every transport.
pub trait Transport: Send + Sync {
    /// Which wire mechanism this is.
    fn kind(&self) -> TransportType;

    /// Take the next request id from this transport's sequence.
    fn next_request_id(&self) -> u64;

    /// Deliver an encoded request and read back exactly one response envelope.
    fn exchange(&self, request: &JsonRpcRequest, body: Vec<u8>) -> Result<JsonRpcResponse>;

    /// Release the connection or process. Safe to call more than once.
    fn close(&self) -> Result<()>;

    /// Whether [`Transport::close`] has run.
    fn is_closed(&self) -> bool;

    /// Issue `method` and return its `result` payload.
    fn request(&self, method: Method, params: Option<Value>) -> Result<Value> {
        if self.is_closed() {
            return Err(McpError::Closed);
        }

        let request = JsonRpcRequest::new(self.next_request_id(), method, params);
        let body = codec::encode(&request)?;

        tracing::debug!(
            transport = %self.kind(),
            method = %method,
            id = request.id,
            "sending MCP request"
        );

        let response = self.exchange(&request, body)?;
        correlate(request.id, response)
    }

    /// Perform the initialize handshake.
    fn initialize(&self, params: &InitializeParams) -> Result<InitializeResult> {
        let params = to_params(Method::Initialize, params)?;
        let result = self.request(Method::Initialize, Some(params))?;
        from_result(Method::Initialize, result)
    }

    /// Fetch one page of the server's tool list.
    fn list_tools(&self, cursor: Option<&str>) -> Result<ListToolsResult> {
        let params = ListToolsParams {
            cursor: cursor.map(str::to_string),
        };
        let params = to_params(Method::ListTools, &params)?;
        let result = self.request(Method::ListTools, Some(params))?;
        from_optional_result(Method::ListTools, result)
    }

    /// Invoke the tool `name` with `arguments`.
    fn call_tool(&self, name: &str, arguments: Option<Value>) -> Result<CallToolResult> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let params = to_params(Method::CallTool, &params)?;
        let result = self.request(Method::CallTool, Some(params))?;
        from_optional_result(Method::CallTool, result)
    }
}

/// Match a response to the request id it should answer and surface protocol errors.
pub fn correlate(expected: u64, response: JsonRpcResponse) -> Result<Value> {
    match response.id {
        Some(actual) if actual != expected => {
            return Err(McpError::IdMismatch { expected, actual });
        }
        // Null ids only survive decoding on error responses.
        _ => {}
    }

    response.into_result().map_err(McpError::from)
}

fn to_params<T: Serialize>(method: Method, params: &T) -> Result<Value> {
    serde_json::to_value(params).map_err(|source| McpError::Encode {
        method: method.as_str().to_string(),
        source,
    })
}

fn from_result<T: serde::de::DeserializeOwned>(method: Method, result: Value) -> Result<T> {
    serde_json::from_value(result)
        .map_err(|e| McpError::decode(format!("unexpected {method} result: {e}")))
}

/// Like [`from_result`], but a `null` result stands for an empty one.
fn from_optional_result<T>(method: Method, result: Value) -> Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    if result.is_null() {
        tracing::debug!(%method, "server returned a null result");
        return Ok(T::default());
    }
    from_result(method, result)
}

/// Shorten a body for inclusion in an error message.
pub(crate) fn snippet(body: &str) -> &str {
    const MAX: usize = 256;
    if body.len() <= MAX {
        return body;
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::protocol::JsonRpcError;

    /// Replies are produced by a closure over the request, so tests can
    /// echo ids or answer with fixed envelopes.
    type Reply = Box<dyn Fn(&JsonRpcRequest) -> Result<JsonRpcResponse> + Send + Sync>;

    struct ScriptedTransport {
        ids: RequestIds,
        replies: Mutex<VecDeque<Reply>>,
        sent: Mutex<Vec<Value>>,
        closed: AtomicBool,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Reply>) -> Self {
            Self {
                ids: RequestIds::new(),
                replies: Mutex::new(replies.into()),
                sent: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn kind(&self) -> TransportType {
            TransportType::Stdio
        }

        fn next_request_id(&self) -> u64 {
            self.ids.next()
        }

        fn exchange(&self, request: &JsonRpcRequest, body: Vec<u8>) -> Result<JsonRpcResponse> {
            self.sent
                .lock()
                .push(serde_json::from_slice(&body).expect("encoded body is JSON"));
            let reply = self
                .replies
                .lock()
                .pop_front()
                .ok_or(McpError::NoResponse("script"))?;
            reply(request)
        }

        fn close(&self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    fn reply(
        f: impl Fn(&JsonRpcRequest) -> Result<JsonRpcResponse> + Send + Sync + 'static,
    ) -> Reply {
        Box::new(f)
    }

    fn echo(result: Value) -> Reply {
        reply(move |req| Ok(JsonRpcResponse::success(req.id, result.clone())))
    }

    #[test]
    fn test_request_ids_strictly_increase() {
        let ids = RequestIds::new();
        assert_eq!(ids.next(), 1);
        assert_eq!(ids.next(), 2);
        assert_eq!(ids.next(), 3);
    }

    #[test]
    fn test_request_ids_unique_across_threads() {
        let ids = Arc::new(RequestIds::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || (0..100).map(|_| ids.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 800);
        assert_eq!(all.first(), Some(&1));
        assert_eq!(all.last(), Some(&800));
    }

    #[test]
    fn test_transport_type_serde() {
        let t: TransportType = serde_json::from_value(json!("sse")).unwrap();
        assert_eq!(t, TransportType::Sse);
        assert_eq!(TransportType::Http.to_string(), "http");
        assert_eq!(TransportType::default(), TransportType::Stdio);
    }

    #[test]
    fn test_ids_increase_across_operations() {
        let transport = ScriptedTransport::new(vec![
            echo(json!({"protocolVersion": "2024-11-05", "serverInfo": {"name": "s", "version": "1"}})),
            echo(json!({"tools": []})),
            echo(json!({"content": []})),
            echo(json!({"content": []})),
        ]);

        transport.initialize(&InitializeParams::default()).unwrap();
        transport.list_tools(None).unwrap();
        transport.call_tool("a", None).unwrap();
        transport.call_tool("b", Some(json!({"x": 1}))).unwrap();

        let sent = transport.sent.lock();
        let ids: Vec<u64> = sent.iter().map(|v| v["id"].as_u64().unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(sent[0]["method"], "initialize");
        assert_eq!(sent[1]["method"], "tools/list");
        assert_eq!(sent[1]["params"], json!({}));
        assert_eq!(sent[3]["params"], json!({"name": "b", "arguments": {"x": 1}}));
    }

    #[test]
    fn test_call_before_initialize_is_allowed() {
        let transport = ScriptedTransport::new(vec![echo(json!({
            "content": [{"type": "text", "text": "hi"}]
        }))]);
        let result = transport.call_tool("echo", Some(json!({"message": "hi"}))).unwrap();
        assert_eq!(result.text().as_deref(), Some("hi"));
    }

    #[test]
    fn test_protocol_error_is_mapped() {
        let transport = ScriptedTransport::new(vec![reply(|_| {
            Ok(JsonRpcResponse::failure(
                None,
                JsonRpcError {
                    code: JsonRpcError::INVALID_PARAMS,
                    message: "Invalid parameters".into(),
                    data: None,
                },
            ))
        })]);

        let err = transport.call_tool("write_file", None).unwrap_err();
        assert!(err.is_protocol());
        assert_eq!(err.code(), Some(-32602));
        assert!(err.to_string().contains("Invalid parameters"));
    }

    #[test]
    fn test_id_mismatch_is_reported() {
        let transport = ScriptedTransport::new(vec![reply(|req| {
            Ok(JsonRpcResponse::success(req.id + 10, json!({"tools": []})))
        })]);
        let err = transport.list_tools(None).unwrap_err();
        assert!(matches!(
            err,
            McpError::IdMismatch {
                expected: 1,
                actual: 11
            }
        ));
    }

    #[test]
    fn test_result_shape_mismatch_is_decode_error() {
        let transport = ScriptedTransport::new(vec![echo(json!({"tools": "not-a-list"}))]);
        let err = transport.list_tools(None).unwrap_err();
        assert!(matches!(err, McpError::Decode(msg) if msg.contains("tools/list")));
    }

    #[test]
    fn test_null_result_is_empty() {
        let transport = ScriptedTransport::new(vec![
            echo(Value::Null),
            echo(Value::Null),
            echo(Value::Null),
        ]);

        let page = transport.list_tools(None).unwrap();
        assert!(page.tools.is_empty());
        assert!(page.next_cursor.is_none());

        let result = transport.call_tool("noop", None).unwrap();
        assert!(result.content.is_empty());
        assert!(!result.is_error());

        // Initialize has no empty form: the server must identify itself.
        let err = transport.initialize(&InitializeParams::default()).unwrap_err();
        assert!(matches!(err, McpError::Decode(msg) if msg.contains("initialize")));
    }

    #[test]
    fn test_failed_call_does_not_poison_transport() {
        let transport = ScriptedTransport::new(vec![
            reply(|_| Err(McpError::transport("tools/call", "boom"))),
            echo(json!({"content": []})),
        ]);
        assert!(transport.call_tool("a", None).is_err());
        assert!(transport.call_tool("a", None).is_ok());
    }

    #[test]
    fn test_closed_transport_rejects_requests() {
        let transport = ScriptedTransport::new(vec![echo(json!({"tools": []}))]);
        transport.close().unwrap();
        transport.close().unwrap();
        assert!(matches!(transport.list_tools(None), Err(McpError::Closed)));
        assert!(transport.sent.lock().is_empty());
    }

    #[test]
    fn test_snippet_respects_char_boundaries() {
        let body = "é".repeat(200);
        let s = snippet(&body);
        assert!(s.len() <= 256);
        assert!(body.starts_with(s));
        assert_eq!(snippet("short"), "short");
    }
}
