//! ISO/IEC 7816-4 padding: a `0x80` marker followed by zero bytes.

use crate::Error;

const MARKER: u8 = 0x80;

/// Padded size of `len` bytes; always at least one byte larger.
pub(crate) fn padded_len(len: usize, block_size: usize) -> usize {
    (len / block_size + 1) * block_size
}

/// Pads `buffer[start..]` up to a multiple of `block_size`.
pub(crate) fn pad(buffer: &mut Vec<u8>, start: usize, block_size: usize) {
    let target = start + padded_len(buffer.len() - start, block_size);
    buffer.push(MARKER);
    buffer.resize(target, 0);
}

/// Returns the unpadded length of `padded`.
///
/// Only the marker and the zeros after it are checked, so the block size the
/// sender padded to does not need to be known.
pub(crate) fn unpadded_len(padded: &[u8]) -> Result<usize, Error> {
    let marker = padded
        .iter()
        .rposition(|&byte| byte != 0)
        .ok_or(Error::Protocol)?;
    if padded[marker] != MARKER {
        return Err(Error::Protocol);
    }

    Ok(marker)
}
