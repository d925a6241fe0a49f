use std::fmt;

/// `holder -> client`: raw PTY output bytes.
pub const OP_DATA_OUT: u8 = 0x01;
/// `client -> holder`: raw stdin bytes. Only honoured for an `attach` peer.
pub const OP_DATA_IN: u8 = 0x02;
/// `client -> holder`: `cols:u16 BE, rows:u16 BE`.
pub const OP_RESIZE: u8 = 0x03;
/// `holder -> client`: `code:i32 BE`, sent once when the child exits.
pub const OP_EXIT: u8 = 0x04;
/// `holder -> client`: UTF-8 error message, sent immediately before the holder closes the connection.
pub const OP_ERROR: u8 = 0x05;
/// `client -> holder`: UTF-8 JSON `{mode, protocolVersion}`, must be the first frame on a connection.
pub const OP_HELLO: u8 = 0x06;
/// `holder -> client`: UTF-8 JSON `{name, cols, rows, mode, pid}`, the reply to `HELLO`.
pub const OP_HELLO_ACK: u8 = 0x07;
/// `holder -> client`: empty payload, marks the end of ring replay and the start of live data.
pub const OP_REPLAY_END: u8 = 0x08;

/// Header is `[type:1][length:4 big-endian]`, always exactly 5 bytes.
pub const HEADER_LEN: usize = 5;

/// A length above this poisons the decoder; `10 * 2^20`.
pub const MAX_PAYLOAD: u32 = 10 * 1024 * 1024;

/// A fully decoded frame: an opcode plus its payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(opcode: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
        }
    }

    /// Serializes this frame to wire bytes: `[opcode][len BE][payload]`.
    pub fn encode(&self) -> Vec<u8> {
        encode(self.opcode, &self.payload)
    }
}

/// Serializes a single frame to wire bytes without allocating a [`Frame`].
pub fn encode(opcode: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.push(opcode);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum FrameError {
    #[error("declared frame length {len} exceeds the {max} byte limit")]
    PayloadTooLarge { len: u32, max: u32 },
    #[error("decoder is poisoned by a previous error")]
    Poisoned,
}

/// A stateful, incremental frame decoder.
///
/// Feed it arbitrary byte chunks — one byte at a time, whole frames at once,
/// or anything in between — and it yields complete frames as they become
/// available, carrying any partial header or payload over to the next feed.
/// An unknown opcode with a well-formed length is decoded like any other
/// frame (forward compatibility); it is the caller's job to skip frames it
/// does not understand.
///
/// Once a declared length exceeds [`MAX_PAYLOAD`] the decoder is poisoned:
/// every subsequent `feed` returns [`FrameError::Poisoned`] until `reset` is
/// called.
pub struct Decoder {
    buf: Vec<u8>,
    poisoned: bool,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            poisoned: false,
        }
    }

    /// Appends `chunk` and returns every complete frame it can now produce,
    /// in wire order. Partial data is retained internally for the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Frame>, FrameError> {
        if self.poisoned {
            return Err(FrameError::Poisoned);
        }
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut offset = 0usize;
        loop {
            if self.buf.len() - offset < HEADER_LEN {
                break;
            }
            let opcode = self.buf[offset];
            let len = u32::from_be_bytes([
                self.buf[offset + 1],
                self.buf[offset + 2],
                self.buf[offset + 3],
                self.buf[offset + 4],
            ]);
            if len > MAX_PAYLOAD {
                self.poisoned = true;
                return Err(FrameError::PayloadTooLarge {
                    len,
                    max: MAX_PAYLOAD,
                });
            }
            let total = HEADER_LEN + len as usize;
            if self.buf.len() - offset < total {
                break;
            }
            let payload_start = offset + HEADER_LEN;
            let payload = self.buf[payload_start..payload_start + len as usize].to_vec();
            frames.push(Frame { opcode, payload });
            offset += total;
        }

        self.buf.drain(..offset);
        Ok(frames)
    }

    /// Discards any buffered partial frame and clears the poisoned state.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.poisoned = false;
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoder")
            .field("buffered", &self.buf.len())
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_matches_wire_layout() {
        let bytes = encode(OP_DATA_OUT, b"AB");
        assert_eq!(bytes, vec![OP_DATA_OUT, 0, 0, 0, 2, b'A', b'B']);
    }

    #[test]
    fn decode_single_whole_frame() {
        let mut d = Decoder::new();
        let frames = d.feed(&encode(OP_DATA_OUT, b"hello")).unwrap();
        assert_eq!(frames, vec![Frame::new(OP_DATA_OUT, b"hello".to_vec())]);
    }

    #[test]
    fn decode_empty_payload_frame() {
        let mut d = Decoder::new();
        let frames = d.feed(&encode(OP_REPLAY_END, b"")).unwrap();
        assert_eq!(frames, vec![Frame::new(OP_REPLAY_END, Vec::new())]);
    }

    #[test]
    fn decode_byte_at_a_time() {
        let mut d = Decoder::new();
        let wire = encode(OP_DATA_OUT, b"xyz");
        let mut out = Vec::new();
        for b in &wire {
            out.extend(d.feed(&[*b]).unwrap());
        }
        assert_eq!(out, vec![Frame::new(OP_DATA_OUT, b"xyz".to_vec())]);
    }

    #[test]
    fn decode_header_split_across_feeds() {
        let mut d = Decoder::new();
        let wire = encode(OP_DATA_OUT, b"hi");
        let (a, b) = wire.split_at(2);
        assert!(d.feed(a).unwrap().is_empty());
        let frames = d.feed(b).unwrap();
        assert_eq!(frames, vec![Frame::new(OP_DATA_OUT, b"hi".to_vec())]);
    }

    #[test]
    fn decode_payload_split_across_feeds() {
        let mut d = Decoder::new();
        let wire = encode(OP_DATA_OUT, b"hello world");
        let (a, b) = wire.split_at(HEADER_LEN + 3);
        assert!(d.feed(a).unwrap().is_empty());
        let frames = d.feed(b).unwrap();
        assert_eq!(frames, vec![Frame::new(OP_DATA_OUT, b"hello world".to_vec())]);
    }

    #[test]
    fn decode_multiple_frames_in_one_chunk() {
        let mut d = Decoder::new();
        let mut wire = encode(OP_DATA_OUT, b"a");
        wire.extend(encode(OP_DATA_OUT, b"b"));
        wire.extend(encode(OP_EXIT, &0i32.to_be_bytes()));
        let frames = d.feed(&wire).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].payload, b"a");
        assert_eq!(frames[1].payload, b"b");
        assert_eq!(frames[2].opcode, OP_EXIT);
    }

    #[test]
    fn binary_payload_with_nuls_preserved() {
        let mut d = Decoder::new();
        let payload = vec![0u8, 1, 0, 2, 0];
        let frames = d.feed(&encode(OP_DATA_IN, &payload)).unwrap();
        assert_eq!(frames[0].payload, payload);
    }

    #[test]
    fn unknown_opcode_decoded_like_any_other() {
        let mut d = Decoder::new();
        let frames = d.feed(&encode(0xFE, b"future")).unwrap();
        assert_eq!(frames[0].opcode, 0xFE);
        assert_eq!(frames[0].payload, b"future");
    }

    #[test]
    fn oversize_length_poisons_decoder() {
        let mut d = Decoder::new();
        let mut header = vec![OP_DATA_OUT];
        header.extend_from_slice(&(MAX_PAYLOAD + 1).to_be_bytes());
        let err = d.feed(&header).unwrap_err();
        assert_eq!(
            err,
            FrameError::PayloadTooLarge {
                len: MAX_PAYLOAD + 1,
                max: MAX_PAYLOAD
            }
        );
        assert!(d.is_poisoned());
        assert_eq!(d.feed(b"anything").unwrap_err(), FrameError::Poisoned);
    }

    #[test]
    fn reset_clears_poison_and_buffer() {
        let mut d = Decoder::new();
        let mut header = vec![OP_DATA_OUT];
        header.extend_from_slice(&(MAX_PAYLOAD + 1).to_be_bytes());
        d.feed(&header).unwrap_err();
        d.reset();
        assert!(!d.is_poisoned());
        let frames = d.feed(&encode(OP_DATA_OUT, b"ok")).unwrap();
        assert_eq!(frames[0].payload, b"ok");
    }

    #[test]
    fn max_payload_exactly_is_accepted() {
        let mut d = Decoder::new();
        let payload = vec![0u8; MAX_PAYLOAD as usize];
        let frames = d.feed(&encode(OP_DATA_OUT, &payload)).unwrap();
        assert_eq!(frames[0].payload.len(), MAX_PAYLOAD as usize);
    }
}
