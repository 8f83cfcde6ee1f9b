//! Stdio transport: newline-delimited JSON over a child process's pipes.
//!
//! Each request is written to the child's stdin as one line and answered by
//! exactly one line on its stdout. A dedicated thread owns stdout and forwards
//! lines over a channel so the calling thread can wait with a deadline instead
//! of blocking in `read_line` forever.

use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::{DEFAULT_TIMEOUT, RequestIds, Transport, TransportType};
use crate::codec;
use crate::error::{McpError, Result};
use crate::protocol::{JsonRpcRequest, JsonRpcResponse};

/// Configuration for spawning a stdio MCP server.
#[derive(Debug, Clone)]
pub struct StdioTransportConfig {
    /// Program to run.
    pub command: String,
    /// Arguments to pass to the program.
    pub args: Vec<String>,
    /// Extra environment variables for the child.
    pub env: Vec<(String, String)>,
    /// How long to wait for each reply line; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl StdioTransportConfig {
    /// Configure `command` with no arguments and the default timeout.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: Vec::new(),
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    /// Add an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Replace the argument list.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Add an environment variable.
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the per-reply timeout (`None` disables it).
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Raw stdout lines are forwarded as bytes; a line that is not UTF-8 is a
/// decode failure for one call, not a broken pipe.
enum ReaderEvent {
    Line(Vec<u8>),
    Failed(io::Error),
}

/// Writer and reply channel. Held for a whole exchange, which is what keeps
/// concurrent callers from interleaving bytes on the pipe.
struct Pipes {
    stdin: Option<BufWriter<ChildStdin>>,
    lines: Receiver<ReaderEvent>,
    /// Requests that timed out and whose replies have not been seen yet.
    abandoned: usize,
}

/// Transport that talks to a spawned MCP server over stdin/stdout.
///
/// Calls from several threads are serialized; there is no multiplexing.
pub struct StdioTransport {
    config: StdioTransportConfig,
    child: Mutex<Option<Child>>,
    pipes: Mutex<Pipes>,
    ids: RequestIds,
    closed: AtomicBool,
}

impl StdioTransport {
    /// Spawn the server process and start reading its stdout.
    pub fn spawn(config: StdioTransportConfig) -> Result<Self> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()); // Let stderr pass through for debugging

        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| {
            McpError::spawn_failed(format!("failed to spawn '{}': {}", config.command, e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::spawn_failed("failed to capture stdin"))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::spawn_failed("failed to capture stdout"))?;

        let (tx, rx) = mpsc::channel();
        let reader = std::thread::Builder::new()
            .name("mcp-stdio-reader".to_string())
            .spawn(move || forward_lines(stdout, tx));
        if let Err(e) = reader {
            let _ = child.kill();
            let _ = child.wait();
            return Err(McpError::spawn_failed(format!(
                "failed to start stdout reader: {e}"
            )));
        }

        tracing::info!(
            command = %config.command,
            pid = child.id(),
            "spawned MCP server"
        );

        Ok(Self {
            config,
            child: Mutex::new(Some(child)),
            pipes: Mutex::new(Pipes {
                stdin: Some(BufWriter::new(stdin)),
                lines: rx,
                abandoned: 0,
            }),
            ids: RequestIds::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Whether the child process is still running.
    pub fn is_running(&self) -> bool {
        match self.child.lock().as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    fn next_line(
        &self,
        lines: &Receiver<ReaderEvent>,
        deadline: Option<Instant>,
        operation: &str,
    ) -> Result<Vec<u8>> {
        let event = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                lines.recv_timeout(remaining).map_err(|e| match e {
                    RecvTimeoutError::Timeout => McpError::Timeout {
                        operation: operation.to_string(),
                        timeout: self.config.timeout.unwrap_or_default(),
                    },
                    RecvTimeoutError::Disconnected => McpError::NoResponse("server process"),
                })?
            }
            None => lines
                .recv()
                .map_err(|_| McpError::NoResponse("server process"))?,
        };

        match event {
            ReaderEvent::Line(line) => Ok(line),
            ReaderEvent::Failed(e) => Err(McpError::transport(
                operation,
                format!("failed to read response: {e}"),
            )),
        }
    }
}

/// Reader thread body. Dropping `tx` on EOF is how callers learn the child
/// closed its output.
fn forward_lines(stdout: ChildStdout, tx: Sender<ReaderEvent>) {
    let mut reader = BufReader::new(stdout);
    loop {
        let mut line = Vec::new();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {
                if tx.send(ReaderEvent::Line(line)).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = tx.send(ReaderEvent::Failed(e));
                break;
            }
        }
    }
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    &line[..end]
}

fn write_line(stdin: &mut BufWriter<ChildStdin>, body: &[u8]) -> io::Result<()> {
    stdin.write_all(body)?;
    stdin.write_all(b"\n")?;
    stdin.flush()
}

impl Transport for StdioTransport {
    fn kind(&self) -> TransportType {
        TransportType::Stdio
    }

    fn next_request_id(&self) -> u64 {
        self.ids.next()
    }

    fn exchange(&self, request: &JsonRpcRequest, body: Vec<u8>) -> Result<JsonRpcResponse> {
        let operation = request.method.as_str();
        let mut pipes = self.pipes.lock();
        if self.is_closed() {
            return Err(McpError::Closed);
        }

        let stdin = pipes.stdin.as_mut().ok_or(McpError::Closed)?;
        write_line(stdin, &body).map_err(|e| {
            McpError::transport(operation, format!("failed to write request: {e}"))
        })?;

        tracing::trace!(
            id = request.id,
            json = %String::from_utf8_lossy(&body),
            "sent MCP message"
        );

        let deadline = self.config.timeout.map(|t| Instant::now() + t);
        loop {
            let line = match self.next_line(&pipes.lines, deadline, operation) {
                Ok(line) => line,
                Err(e) => {
                    if matches!(e, McpError::Timeout { .. }) {
                        pipes.abandoned += 1;
                    }
                    return Err(e);
                }
            };
            let line = trim_line_end(&line);
            tracing::trace!(json = %String::from_utf8_lossy(line), "received MCP message");

            let response = codec::decode(line)?;
            match response.id {
                // A reply to a request that already timed out.
                Some(stale) if stale < request.id => {
                    pipes.abandoned = pipes.abandoned.saturating_sub(1);
                    tracing::warn!(
                        stale_id = stale,
                        id = request.id,
                        "discarding late reply to an abandoned request"
                    );
                }
                // Null ids only appear on errors and cannot be correlated, so
                // while a timed-out request is outstanding one is assumed late.
                None if pipes.abandoned > 0 => {
                    pipes.abandoned -= 1;
                    tracing::warn!(
                        id = request.id,
                        error = ?response.error,
                        "discarding null-id error reply while a timed-out request is outstanding"
                    );
                }
                _ => return Ok(response),
            }
        }
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Kill before taking the pipe lock: an in-flight exchange holds it
        // until the reader sees EOF.
        if let Some(mut child) = self.child.lock().take() {
            let _ = child.kill();
            match child.wait() {
                Ok(status) => tracing::debug!(%status, "MCP server exited"),
                Err(e) => tracing::debug!(error = %e, "failed to reap MCP server"),
            }
        }
        self.pipes.lock().stdin.take();

        tracing::info!(command = %self.config.command, "closed stdio transport");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_nonexistent_command() {
        let result = StdioTransport::spawn(StdioTransportConfig::new("nonexistent-mcp-server-12345"));
        match result {
            Ok(_) => panic!("Expected spawn to fail"),
            Err(err) => assert!(matches!(err, McpError::SpawnFailed(_))),
        }
    }

    #[test]
    fn test_config_builder() {
        let config = StdioTransportConfig::new("mcp-server")
            .with_arg("--db")
            .with_arg("/tmp/db")
            .with_env_var("DEBUG", "1")
            .with_timeout(None);
        assert_eq!(config.args, vec!["--db", "/tmp/db"]);
        assert_eq!(config.env, vec![("DEBUG".to_string(), "1".to_string())]);
        assert_eq!(config.timeout, None);
        assert_eq!(
            StdioTransportConfig::new("x").timeout,
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_trim_line_end() {
        assert_eq!(trim_line_end(b"{}\r\n"), b"{}");
        assert_eq!(trim_line_end(b"{}"), b"{}");
        assert_eq!(trim_line_end(b"\n"), b"");
        assert_eq!(trim_line_end(b"\xff\xfe garbage\n"), b"\xff\xfe garbage");
    }

    #[cfg(unix)]
    #[test]
    fn test_close_twice() {
        let transport = StdioTransport::spawn(StdioTransportConfig::new("cat")).unwrap();
        assert_eq!(transport.kind(), TransportType::Stdio);
        assert!(transport.is_running());

        transport.close().unwrap();
        transport.close().unwrap();
        assert!(transport.is_closed());
        assert!(!transport.is_running());
        assert!(matches!(transport.list_tools(None), Err(McpError::Closed)));
    }

    #[cfg(unix)]
    #[test]
    fn test_peer_that_is_not_a_server() {
        // `cat` echoes the request back, which is not a response envelope.
        let transport = StdioTransport::spawn(StdioTransportConfig::new("cat")).unwrap();
        let err = transport.list_tools(None).unwrap_err();
        assert!(matches!(err, McpError::Decode(_)), "got {err}");
    }

    #[cfg(unix)]
    #[test]
    fn test_child_exits_without_output() {
        let transport = StdioTransport::spawn(StdioTransportConfig::new("true")).unwrap();
        let err = transport.list_tools(None).unwrap_err();
        // Either the write hits a closed pipe or the read sees EOF first.
        assert!(err.is_transport(), "got {err}");
    }
}
