//! Event-stream transport (streamable HTTP).
//!
//! Requests are ordinary JSON POSTs, but the server may answer with either a
//! single JSON object or a `text/event-stream` body. The body is read in full
//! before it is interpreted.

use url::Url;

use super::http::{HttpChannel, HttpReply, HttpTransportConfig};
use super::{RequestIds, Transport, TransportType};
use crate::codec;
use crate::error::{McpError, Result};
use crate::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::sse;

const ACCEPT_BOTH: &str = "application/json, text/event-stream";
const PROTOCOL_VERSION_HEADER: &str = "MCP-Protocol-Version";

/// HTTP transport that understands SSE-framed replies.
pub struct EventStreamTransport {
    channel: HttpChannel,
    ids: RequestIds,
}

impl EventStreamTransport {
    /// Create a new event-stream transport.
    ///
    /// Requests go to the `/message` endpoint under the configured URL; a URL
    /// that already ends in `/message` is used as is.
    pub fn connect(config: HttpTransportConfig) -> Result<Self> {
        let endpoint = message_endpoint(config.parse_url()?)?;
        let channel = HttpChannel::open(config, endpoint)?;

        tracing::info!(
            url = %channel.endpoint(),
            timeout_secs = channel.config().timeout.as_secs(),
            protocol = %channel.config().protocol_version,
            "created SSE transport"
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

    fn interpret(reply: HttpReply, operation: &str) -> Result<JsonRpcResponse> {
        if !reply.status.is_success() {
            return reply.into_status_error(operation);
        }

        if is_event_stream(&reply.content_type) {
            tracing::debug!(bytes = reply.body.len(), "parsing SSE response body");
            sse::first_response(&reply.body)
        } else {
            codec::decode(reply.body.as_bytes())
        }
    }
}

/// JSON wins when a server lists both; anything not declaring an event stream
/// is treated as JSON.
fn is_event_stream(content_type: &str) -> bool {
    content_type.contains("text/event-stream") && !content_type.contains("application/json")
}

fn message_endpoint(mut url: Url) -> Result<Url> {
    if url.path().trim_end_matches('/').ends_with("/message") {
        return Ok(url);
    }

    if url.cannot_be_a_base() {
        return Err(McpError::transport(
            "connect",
            format!("URL '{url}' cannot carry a path"),
        ));
    }
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push("message");
    }
    Ok(url)
}

impl Transport for EventStreamTransport {
    fn kind(&self) -> TransportType {
        TransportType::Sse
    }

    fn next_request_id(&self) -> u64 {
        self.ids.next()
    }

    fn exchange(&self, request: &JsonRpcRequest, body: Vec<u8>) -> Result<JsonRpcResponse> {
        let version = self.channel.config().protocol_version.clone();
        let reply = self.channel.post(
            request,
            body,
            &[("Accept", ACCEPT_BOTH), (PROTOCOL_VERSION_HEADER, version.as_str())],
        )?;
        Self::interpret(reply, &request.method)
    }

    fn close(&self) -> Result<()> {
        if self.channel.close() {
            tracing::debug!(url = %self.channel.endpoint(), "closed SSE transport");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }
}
