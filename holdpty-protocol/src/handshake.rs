use serde::{Deserialize, Serialize};

/// The three ways a client can attach to a session, carried in `HELLO` and
/// echoed back in `HELLO_ACK`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Exclusive read-write peer: stdin is forwarded, resize is honoured.
    Attach,
    /// Read-only peer: receives replay then live output, nothing is forwarded.
    View,
    /// Receives replay then an immediate `REPLAY_END` and disconnects.
    Logs,
}

/// The only protocol version this implementation speaks.
pub const PROTOCOL_VERSION: u32 = 1;

/// First frame a client must send, as `HELLO`'s JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hello {
    pub mode: Mode,
    #[serde(rename = "protocolVersion")]
    pub protocol_version: u32,
}

impl Hello {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

/// The holder's reply to a successful `HELLO`, as `HELLO_ACK`'s JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloAck {
    pub name: String,
    pub cols: u16,
    pub rows: u16,
    pub mode: Mode,
    pub pid: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_roundtrips_through_json() {
        let h = Hello::new(Mode::Attach);
        let json = serde_json::to_string(&h).unwrap();
        assert!(json.contains("\"mode\":\"attach\""));
        assert!(json.contains("\"protocolVersion\":1"));
        let back: Hello = serde_json::from_str(&json).unwrap();
        assert_eq!(back.mode, Mode::Attach);
        assert_eq!(back.protocol_version, 1);
    }

    #[test]
    fn hello_ack_roundtrips_through_json() {
        let ack = HelloAck {
            name: "bold-otter".to_string(),
            cols: 80,
            rows: 24,
            mode: Mode::View,
            pid: 4242,
        };
        let json = serde_json::to_string(&ack).unwrap();
        let back: HelloAck = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "bold-otter");
        assert_eq!(back.mode, Mode::View);
        assert_eq!(back.pid, 4242);
    }

    #[test]
    fn mode_values_match_wire_strings() {
        assert_eq!(serde_json::to_string(&Mode::Attach).unwrap(), "\"attach\"");
        assert_eq!(serde_json::to_string(&Mode::View).unwrap(), "\"view\"");
        assert_eq!(serde_json::to_string(&Mode::Logs).unwrap(), "\"logs\"");
    }
}
