use crate::Error;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

pub(crate) fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Little-endian `u32` length of a variable-length field.
pub(crate) fn length_prefix(len: usize) -> Result<[u8; 4], Error> {
    u32::try_from(len)
        .map(u32::to_le_bytes)
        .map_err(|_| Error::Protocol)
}

/// Decodes standard base64 into a fixed-size array, rejecting any other length.
pub(crate) fn decode_array<const N: usize>(encoded: &str) -> Result<[u8; N], Error> {
    let decoded = STANDARD.decode(encoded)?;
    <[u8; N]>::try_from(decoded.as_slice())
        .map_err(|_| Error::Serde(format!("Expected {N} bytes, got {}", decoded.len())))
}
