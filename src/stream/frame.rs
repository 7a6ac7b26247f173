use crate::types::encoding::length_prefix;
use crate::Error;

/// Size of the little-endian length prefix in front of every frame.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Writes `[u32 LE len][body]` to the front of `out` and returns the bytes written.
pub(crate) fn write_frame(out: &mut [u8], body: &[u8]) -> Result<usize, Error> {
    let prefix = length_prefix(body.len())?;
    let total = LENGTH_PREFIX_LEN + body.len();
    let actual = out.len();
    let dest = out.get_mut(..total).ok_or(Error::SizeViolation {
        required: total,
        actual,
    })?;

    dest[..LENGTH_PREFIX_LEN].copy_from_slice(&prefix);
    dest[LENGTH_PREFIX_LEN..].copy_from_slice(body);
    Ok(total)
}

pub(crate) fn frame_len(prefix: [u8; LENGTH_PREFIX_LEN]) -> usize {
    u32::from_le_bytes(prefix) as usize
}
