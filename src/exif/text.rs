//! Text encodings used by the descriptive tags.
//!
//! Windows Explorer reads the `XP*` tags of IFD0 as NUL-terminated UTF-16LE
//! stored in a BYTE array. The older tags (`ImageDescription`, `Artist`, ...)
//! are single-byte ASCII strings; in practice many tools put UTF-8 there, so
//! that is what is written and what is accepted back.

/// Encode a string as UTF-16LE bytes with a two-byte NUL terminator.
pub fn encode_wide_text(s: &str) -> Vec<u8> {
    let mut bytes: Vec<u8> = s.encode_utf16().flat_map(|c| c.to_le_bytes()).collect();
    // Null terminator
    bytes.push(0);
    bytes.push(0);
    bytes
}

/// Decode UTF-16LE code units up to the first zero unit or the end of the
/// buffer, whichever comes first. A trailing odd byte is ignored.
pub fn decode_wide_text(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

/// Encode a string for an ASCII-typed tag (bytes plus NUL terminator).
pub fn encode_ascii_text(s: &str) -> Vec<u8> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    bytes
}

/// Decode an ASCII-typed tag value up to its first NUL.
pub fn decode_ascii_text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
