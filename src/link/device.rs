//! # Half-duplex command/response link.
//!
//! [`DeviceLink`] owns one byte stream and runs one exchange at a time:
//!
//! ```text
//! send(cmd, timeout)
//!   ├─► write "cmd" + terminator               (bounded by the deadline)
//!   └─► read bytes, split on CR / LF / prompt   (bounded by the same deadline)
//!         ├─ echo of cmd, blank     ──► skipped
//!         ├─ ok marker              ──► Ok(lines so far)
//!         ├─ error marker           ──► Err(Rejected)       link stays usable
//!         ├─ prompt                 ──► Ok(lines) / Err(Rejected)
//!         └─ deadline / EOF / I/O   ──► Err(Timeout | Io)    link becomes unusable
//! ```
//!
//! After a timeout or I/O error the stream is released and every later call
//! returns [`LinkError::Closed`]; the owner decides whether to rediscover.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use super::connector::{Connector, LinkStream};
use super::protocol::LineProtocol;
use crate::error::LinkError;

const READ_CHUNK: usize = 256;
const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// Timeout-bounded command/response transport over one byte stream.
pub struct DeviceLink {
    address: String,
    protocol: LineProtocol,
    stream: Option<Box<dyn LinkStream>>,
    pending: Vec<u8>,
}

impl DeviceLink {
    /// Opens `address` through `connector`.
    pub async fn connect(
        connector: &dyn Connector,
        address: &str,
        protocol: LineProtocol,
    ) -> Result<Self, LinkError> {
        let stream = connector.open(address).await?;
        debug!(address, "device link opened");
        Ok(Self::from_stream(address, protocol, stream))
    }

    /// Wraps an already open stream.
    pub fn from_stream(
        address: impl Into<String>,
        protocol: LineProtocol,
        stream: Box<dyn LinkStream>,
    ) -> Self {
        Self {
            address: address.into(),
            protocol,
            stream: Some(stream),
            pending: Vec::with_capacity(READ_CHUNK),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn protocol(&self) -> &LineProtocol {
        &self.protocol
    }

    /// False once released or degraded by a timeout or I/O error.
    pub fn is_usable(&self) -> bool {
        self.stream.is_some()
    }

    /// Sends the protocol's probe command. Any well-formed answer, including
    /// a rejection, counts as alive.
    pub async fn probe(&mut self) -> bool {
        let cmd = self.protocol.probe_command;
        match self.send(cmd, self.protocol.probe_timeout).await {
            Ok(_) | Err(LinkError::Rejected { .. }) => true,
            Err(e) => {
                debug!(address = %self.address, error = %e, "probe failed");
                false
            }
        }
    }

    /// Runs one exchange. `timeout` bounds the whole call.
    pub async fn send(&mut self, command: &str, timeout: Duration) -> Result<Vec<String>, LinkError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(LinkError::Closed);
        };
        let deadline = Instant::now() + timeout;
        self.pending.clear();

        let result = exchange(
            &mut **stream,
            &mut self.pending,
            &self.protocol,
            command,
            deadline,
            timeout,
        )
        .await;

        if let Err(e) = &result {
            if e.degrades_link() {
                warn!(address = %self.address, command, error = %e, "device link degraded");
                self.stream = None;
            }
        }
        result
    }

    /// Releases the stream. Idempotent.
    pub async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = time::timeout(SHUTDOWN_TIMEOUT, stream.shutdown()).await;
            debug!(address = %self.address, "device link closed");
        }
    }
}

impl std::fmt::Debug for DeviceLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLink")
            .field("address", &self.address)
            .field("usable", &self.is_usable())
            .finish()
    }
}

enum Token {
    Line(String),
    Prompt,
}

async fn exchange(
    stream: &mut dyn LinkStream,
    buf: &mut Vec<u8>,
    protocol: &LineProtocol,
    command: &str,
    deadline: Instant,
    timeout: Duration,
) -> Result<Vec<String>, LinkError> {
    let timed_out = || LinkError::Timeout {
        command: command.to_string(),
        after: timeout,
    };

    let frame = format!("{command}{}", protocol.terminator);
    time::timeout_at(deadline, async {
        stream.write_all(frame.as_bytes()).await?;
        stream.flush().await
    })
    .await
    .map_err(|_| timed_out())??;

    let mut lines = Vec::new();
    let mut rejected = false;
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        while let Some(token) = next_token(buf, protocol.prompt) {
            let line = match token {
                Token::Prompt if rejected => {
                    return Err(LinkError::Rejected {
                        command: command.to_string(),
                        reply: lines,
                    });
                }
                Token::Prompt => return Ok(lines),
                Token::Line(line) => line,
            };
            let line = line.trim();
            if line.is_empty() || line == command {
                continue;
            }
            if protocol.is_ok(line) {
                return Ok(lines);
            }
            if protocol.is_error(line) {
                lines.push(line.to_string());
                if protocol.prompt.is_none() {
                    return Err(LinkError::Rejected {
                        command: command.to_string(),
                        reply: lines,
                    });
                }
                rejected = true;
                continue;
            }
            lines.push(line.to_string());
        }

        let n = time::timeout_at(deadline, stream.read(&mut chunk))
            .await
            .map_err(|_| timed_out())??;
        if n == 0 {
            return Err(LinkError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "device closed the stream",
            )));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Splits the next line or prompt off the front of `buf`.
fn next_token(buf: &mut Vec<u8>, prompt: Option<u8>) -> Option<Token> {
    let is_prompt = |b: u8| prompt == Some(b);
    let pos = buf
        .iter()
        .position(|&b| b == b'\r' || b == b'\n' || is_prompt(b))?;

    if is_prompt(buf[pos]) {
        if pos == 0 {
            buf.drain(..1);
            return Some(Token::Prompt);
        }
        let line = String::from_utf8_lossy(&buf[..pos]).into_owned();
        buf.drain(..pos);
        return Some(Token::Line(line));
    }

    let line = String::from_utf8_lossy(&buf[..pos]).into_owned();
    buf.drain(..=pos);
    Some(Token::Line(line))
}
