//! Wire framing and handshake payload types shared by the holder and every
//! client front-end. This crate has no notion of a PTY, a session directory,
//! or a runtime — it only knows how to turn bytes into [`frame::Frame`]s and
//! back, and how the JSON handshake payloads are shaped.

pub mod frame;
pub mod handshake;
pub mod resize;

pub use frame::{
    Decoder, Frame, FrameError, HEADER_LEN, MAX_PAYLOAD, OP_DATA_IN, OP_DATA_OUT, OP_ERROR,
    OP_EXIT, OP_HELLO, OP_HELLO_ACK, OP_REPLAY_END, OP_RESIZE,
};
pub use handshake::{Hello, HelloAck, Mode, PROTOCOL_VERSION};
pub use resize::{decode_exit_code, decode_resize, encode_exit_code, encode_resize};
