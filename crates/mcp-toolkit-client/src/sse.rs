//! Server-sent event framing for the event-stream transport.
//!
//! Only `data:` lines matter; each blank-line-terminated event is one JSON
//! message. Comments (`:`) and other fields (`event:`, `id:`, `retry:`) are
//! skipped.

use crate::codec;
use crate::error::{McpError, Result};
use crate::protocol::JsonRpcResponse;

/// Reassembles SSE events from individual lines.
#[derive(Debug, Default)]
pub struct SseFrameDecoder {
    data_lines: Vec<String>,
}

impl SseFrameDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (terminator already stripped; a trailing `\r` is tolerated).
    ///
    /// Returns the event payload when a blank line completes a non-empty event.
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.is_empty() {
            if self.data_lines.is_empty() {
                return None;
            }
            let payload = self.data_lines.join("\n");
            self.data_lines.clear();
            return Some(payload);
        }

        if line.starts_with(':') {
            return None;
        }

        if let Some(rest) = line.strip_prefix("data:") {
            self.data_lines.push(rest.trim().to_string());
        }

        None
    }

    /// Whether data lines are buffered without a terminating blank line yet.
    pub fn has_pending(&self) -> bool {
        !self.data_lines.is_empty()
    }
}

/// Scan an event-stream body and return the first event that decodes as a
/// response envelope.
///
/// Events that fail to decode are logged and skipped so that one bad frame
/// does not hide a good one after it.
pub fn first_response(body: &str) -> Result<JsonRpcResponse> {
    let mut decoder = SseFrameDecoder::new();
    let mut dropped = 0usize;

    for line in body.lines() {
        let Some(payload) = decoder.push_line(line) else {
            continue;
        };

        match codec::decode(payload.as_bytes()) {
            Ok(response) => {
                tracing::debug!(dropped, "decoded SSE event");
                return Ok(response);
            }
            Err(e) => {
                dropped += 1;
                tracing::warn!(error = %e, data = %payload, "failed to decode SSE event, skipping");
            }
        }
    }

    if decoder.has_pending() {
        tracing::debug!("SSE stream ended inside an unterminated event");
    }

    Err(McpError::NoResponse("SSE stream"))
}
