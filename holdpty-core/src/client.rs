use std::sync::Arc;

use holdpty_protocol::{
    encode_exit_code, Decoder, Frame, Hello, HelloAck, Mode, OP_DATA_IN, OP_ERROR, OP_EXIT,
    OP_HELLO, OP_HELLO_ACK, OP_REPLAY_END, OP_RESIZE, PROTOCOL_VERSION,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, Notify};

use crate::holder::Shared;
use crate::listener::Stream;
use crate::log;

const CLIENT_QUEUE_CAPACITY: usize = 256;

/// Substring every exclusivity-rejection `ERROR` message carries, so
/// `peer::connect` can tell this specific rejection apart from any other
/// wire-level `ERROR` without the framing format growing an opcode of its
/// own for it.
pub(crate) const EXCLUSIVITY_MARKER: &str = "active attachment";

/// Drives one accepted connection end to end: pre-handshake, handshake, and
/// (for attach/view) the live loop, then cleans up its registration.
pub async fn run(id: u64, stream: Box<dyn Stream>, shared: Arc<Shared>) {
    let (mut read_half, mut write_half) = tokio::io::split(stream);
    let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(CLIENT_QUEUE_CAPACITY);
    let kill = Arc::new(Notify::new());
    let writer_kill = kill.clone();

    let writer_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = writer_kill.notified() => break,
                msg = out_rx.recv() => match msg {
                    Some(bytes) => {
                        if write_half.write_all(&bytes).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        let _ = write_half.shutdown().await;
    });

    let mut decoder = Decoder::new();
    let mode = handshake(id, &mut read_half, &mut decoder, &out_tx, &kill, &shared).await;

    if let Some(mode) = mode {
        if mode != Mode::Logs {
            live_loop(id, mode, &mut read_half, decoder, &out_tx, &kill, &shared).await;
        }
    }

    if shared.writer_slot.lock().as_ref() == Some(&id) {
        *shared.writer_slot.lock() = None;
    }
    shared.unregister(id);
    drop(out_tx);
    kill.notify_one();
    let _ = writer_task.await;
    log::operational_log!("client {id} disconnected");
}

async fn send(out_tx: &mpsc::Sender<Vec<u8>>, opcode: u8, payload: Vec<u8>) {
    let _ = out_tx.send(holdpty_protocol::frame::encode(opcode, &payload)).await;
}

async fn send_error(out_tx: &mpsc::Sender<Vec<u8>>, message: &str) {
    send(out_tx, OP_ERROR, message.as_bytes().to_vec()).await;
}

/// Reads frames until a complete `HELLO` is parsed, validates it, performs
/// the replay handshake, and returns the negotiated mode — or `None` if the
/// connection was closed (error, exclusivity conflict, or a finished *logs*
/// handshake that never needs a live loop).
async fn handshake(
    id: u64,
    read_half: &mut (impl tokio::io::AsyncRead + Unpin),
    decoder: &mut Decoder,
    out_tx: &mpsc::Sender<Vec<u8>>,
    kill: &Notify,
    shared: &Arc<Shared>,
) -> Option<Mode> {
    let mut buf = [0u8; 8192];
    loop {
        let frames = tokio::select! {
            biased;
            _ = kill.notified() => return None,
            n = read_half.read(&mut buf) => match n {
                Ok(0) | Err(_) => return None,
                Ok(n) => match decoder.feed(&buf[..n]) {
                    Ok(frames) => frames,
                    Err(_) => {
                        send_error(out_tx, "frame too large").await;
                        return None;
                    }
                },
            },
        };

        for frame in frames {
            return Some(handle_first_frame(id, frame, out_tx, shared).await?);
        }
    }
}

async fn handle_first_frame(
    id: u64,
    frame: Frame,
    out_tx: &mpsc::Sender<Vec<u8>>,
    shared: &Arc<Shared>,
) -> Option<Mode> {
    if frame.opcode != OP_HELLO {
        send_error(out_tx, "Expected HELLO").await;
        return None;
    }

    let hello: Hello = match serde_json::from_slice(&frame.payload) {
        Ok(h) => h,
        Err(e) => {
            send_error(out_tx, &format!("invalid HELLO payload: {e}")).await;
            return None;
        }
    };
    if hello.protocol_version != PROTOCOL_VERSION {
        send_error(
            out_tx,
            &format!(
                "unsupported protocolVersion {} (this holder speaks protocol version {PROTOCOL_VERSION})",
                hello.protocol_version
            ),
        )
        .await;
        return None;
    }

    if hello.mode == Mode::Attach {
        let already_held = {
            let mut slot = shared.writer_slot.lock();
            if slot.is_some() {
                true
            } else {
                *slot = Some(id);
                false
            }
        };
        if already_held {
            send_error(
                out_tx,
                &format!(
                    "Session '{}' has an {EXCLUSIVITY_MARKER}. Use view for read-only access.",
                    shared.name
                ),
            )
            .await;
            log::operational_log!("client {id} rejected: {EXCLUSIVITY_MARKER} already held");
            return None;
        }
    }

    let (cols, rows) = shared.cols_rows();
    let ack = HelloAck {
        name: shared.name.clone(),
        cols,
        rows,
        mode: hello.mode,
        pid: shared.holder_pid,
    };
    send(
        out_tx,
        OP_HELLO_ACK,
        serde_json::to_vec(&ack).expect("HelloAck always serializes"),
    )
    .await;

    let snapshot = if hello.mode == Mode::Logs {
        shared.snapshot_only()
    } else {
        shared.snapshot_and_register(id, out_tx.clone())
    };
    if !snapshot.is_empty() {
        send(out_tx, holdpty_protocol::OP_DATA_OUT, snapshot).await;
    }
    send(out_tx, OP_REPLAY_END, Vec::new()).await;

    if hello.mode == Mode::Logs {
        return None;
    }

    if let Some(code) = shared.exit_code() {
        send(out_tx, OP_EXIT, encode_exit_code(code)).await;
        return None;
    }

    Some(hello.mode)
}

/// Post-handshake loop for `attach`/`view` clients: relays `DATA_IN`/`RESIZE`
/// to the PTY for `attach`, ignores everything else, and exits on close,
/// kill, or the holder's shutdown broadcast (delivered as a normal `EXIT`
/// frame through the same outbound channel, at which point the sender side
/// is simply dropped by the holder and this loop observes EOF on read).
async fn live_loop(
    _id: u64,
    mode: Mode,
    read_half: &mut (impl tokio::io::AsyncRead + Unpin),
    mut decoder: Decoder,
    out_tx: &mpsc::Sender<Vec<u8>>,
    kill: &Notify,
    shared: &Arc<Shared>,
) {
    let mut buf = [0u8; 8192];
    loop {
        let frames = tokio::select! {
            biased;
            _ = kill.notified() => return,
            _ = out_tx.closed() => return,
            n = read_half.read(&mut buf) => match n {
                Ok(0) | Err(_) => return,
                Ok(n) => match decoder.feed(&buf[..n]) {
                    Ok(frames) => frames,
                    Err(_) => return,
                },
            },
        };

        for frame in frames {
            match frame.opcode {
                OP_DATA_IN if mode == Mode::Attach => {
                    shared.write_to_pty(&frame.payload);
                }
                OP_RESIZE if mode == Mode::Attach => {
                    if let Some((cols, rows)) = holdpty_protocol::decode_resize(&frame.payload) {
                        shared.resize_pty(cols, rows);
                    }
                }
                _ => {}
            }
        }
    }
}
