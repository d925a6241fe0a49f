//! Client-side runtime: the protocol peer state machine an external
//! front-end (or one of our own integration tests) drives to attach, view,
//! or fetch logs from a session. This module never touches a PTY or the
//! registry's write paths — it only speaks the wire protocol documented in
//! `holdpty-protocol` against whatever endpoint `holdpty_registry` resolves.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use holdpty_protocol::{Decoder, Frame, Hello, HelloAck, Mode, OP_ERROR, OP_HELLO_ACK};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::HolderError;
use crate::listener;

/// Upper bound on waiting for `HELLO_ACK`/`ERROR` after sending `HELLO`.
/// A holder that has accepted the connection but never replies (wedged PTY
/// spawn, stuck handshake task) must not hang its peer forever — the same
/// bounded-wait idiom `holdpty_registry::liveness` uses for its endpoint
/// probe, just with a longer budget since this crosses a real handshake
/// round trip instead of a bare connect.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// An established, handshaken connection to a holder.
pub struct PeerConnection {
    stream: Box<dyn listener::Stream>,
    decoder: Decoder,
    pending: VecDeque<Frame>,
    pub ack: HelloAck,
}

impl PeerConnection {
    /// Sends raw stdin bytes. The holder ignores this unless the connection
    /// negotiated `Mode::Attach`.
    pub async fn send_data(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.write_frame(holdpty_protocol::OP_DATA_IN, bytes).await
    }

    /// Requests a terminal resize. Ignored by the holder outside `Mode::Attach`.
    pub async fn send_resize(&mut self, cols: u16, rows: u16) -> std::io::Result<()> {
        self.write_frame(holdpty_protocol::OP_RESIZE, &holdpty_protocol::encode_resize(cols, rows))
            .await
    }

    async fn write_frame(&mut self, opcode: u8, payload: &[u8]) -> std::io::Result<()> {
        self.stream
            .write_all(&holdpty_protocol::frame::encode(opcode, payload))
            .await
    }

    /// Returns the next frame, reading more from the socket if none is
    /// already buffered. `Ok(None)` means the holder closed the connection.
    pub async fn next_frame(&mut self) -> std::io::Result<Option<Frame>> {
        if let Some(frame) = self.pending.pop_front() {
            return Ok(Some(frame));
        }
        let mut buf = [0u8; 8192];
        loop {
            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                return Ok(None);
            }
            let frames = self
                .decoder
                .feed(&buf[..n])
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            self.pending.extend(frames);
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(frame));
            }
        }
    }
}

/// Connects to the named session's endpoint, performs the `HELLO`/`HELLO_ACK`
/// handshake, and returns a connection ready for `mode`'s traffic. The
/// replay (`DATA_OUT`* then `REPLAY_END`, possibly followed by `EXIT`) is
/// left in the connection's queue for the caller to drain via `next_frame`.
pub async fn connect(dir: Option<&Path>, name: &str, mode: Mode) -> Result<PeerConnection, HolderError> {
    let dir = holdpty_registry::session_dir(dir)?;
    if holdpty_registry::metadata::read_metadata(&dir, name).is_err() {
        return Err(HolderError::NotFound {
            name: name.to_string(),
        });
    }

    #[cfg(unix)]
    let stream = listener::connect(&holdpty_registry::endpoint_path(&dir, name)).await?;
    #[cfg(windows)]
    let stream = listener::connect(&holdpty_registry::endpoint_name(&dir, name)).await?;

    let mut conn = PeerConnection {
        stream,
        decoder: Decoder::new(),
        pending: VecDeque::new(),
        ack: HelloAck {
            name: name.to_string(),
            cols: 0,
            rows: 0,
            mode,
            pid: 0,
        },
    };

    let hello = Hello::new(mode);
    conn.stream
        .write_all(&holdpty_protocol::frame::encode(
            holdpty_protocol::OP_HELLO,
            &serde_json::to_vec(&hello).expect("Hello always serializes"),
        ))
        .await?;

    let frame = tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.next_frame())
        .await
        .map_err(|_| HolderError::Timeout("HELLO_ACK"))??
        .ok_or_else(|| HolderError::Protocol("holder closed connection before HELLO_ACK".into()))?;

    match frame.opcode {
        OP_HELLO_ACK => {
            conn.ack = serde_json::from_slice(&frame.payload)
                .map_err(|e| HolderError::Protocol(format!("invalid HELLO_ACK: {e}")))?;
            Ok(conn)
        }
        OP_ERROR => {
            let message = String::from_utf8_lossy(&frame.payload).into_owned();
            if message.contains(crate::client::EXCLUSIVITY_MARKER) {
                Err(HolderError::Exclusivity {
                    name: name.to_string(),
                })
            } else {
                Err(HolderError::Protocol(message))
            }
        }
        other => Err(HolderError::Protocol(format!(
            "expected HELLO_ACK, got opcode {other}"
        ))),
    }
}
