/// Decodes a `RESIZE` payload (`cols:u16 BE, rows:u16 BE`).
pub fn decode_resize(payload: &[u8]) -> Option<(u16, u16)> {
    if payload.len() != 4 {
        return None;
    }
    let cols = u16::from_be_bytes([payload[0], payload[1]]);
    let rows = u16::from_be_bytes([payload[2], payload[3]]);
    Some((cols, rows))
}

/// Encodes a `RESIZE` payload.
pub fn encode_resize(cols: u16, rows: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(4);
    out.extend_from_slice(&cols.to_be_bytes());
    out.extend_from_slice(&rows.to_be_bytes());
    out
}

/// Decodes an `EXIT` payload (`code:i32 BE`).
pub fn decode_exit_code(payload: &[u8]) -> Option<i32> {
    if payload.len() != 4 {
        return None;
    }
    Some(i32::from_be_bytes([
        payload[0], payload[1], payload[2], payload[3],
    ]))
}

/// Encodes an `EXIT` payload.
pub fn encode_exit_code(code: i32) -> Vec<u8> {
    code.to_be_bytes().to_vec()
}
