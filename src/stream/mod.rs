//! Chunked authenticated-encryption stream codec.
//!
//! A stream is framed as
//! `[u32 LE header len][header][u32 LE len 1][chunk 1]...[u32 LE len N][chunk N]`.
//! The header is the nonce prefix of an XChaCha20-Poly1305 STREAM instance.
//! Each chunk seals `[tag][plaintext]`; only the last chunk carries
//! [`ChunkTag::Final`] and only its plaintext is padded. The total stream
//! length is bound into every chunk as associated data, so the decoder's
//! end-of-stream check cannot be steered by a forged length.

mod cipher;
pub use cipher::{ChunkTag, HEADER_LEN, StreamHeader, TAG_LEN};

mod decrypt;
pub use decrypt::{AsyncStreamDecryptor, StreamDecryptor};

mod encrypt;
pub use encrypt::{AsyncStreamEncryptor, ProgressCallback, StreamEncryptor};

mod frame;
pub use frame::LENGTH_PREFIX_LEN;

mod padding;
pub(crate) use padding::padded_len;

use crate::config::StreamConfig;
use crate::provider::Provider;
use crate::types::SymmetricKey;
use crate::Error;

/// Exact number of ciphertext bytes produced for `plaintext_len` input bytes.
///
/// Transports use it to advertise the stream length before encryption starts.
/// Fails with [`Error::Config`] for an invalid `config` and with
/// [`Error::Protocol`] when the length does not fit in a `u64`.
pub fn ciphertext_len(plaintext_len: u64, config: &StreamConfig) -> Result<u64, Error> {
    config.validate()?;

    let max_chunk = config.max_chunk_size as u64;
    let full_chunks = plaintext_len.saturating_sub(1) / max_chunk;
    // At most `max_chunk` bytes, which fits in a usize
    let tail = (plaintext_len - full_chunks * max_chunk) as usize;

    let full_frame = (LENGTH_PREFIX_LEN + 1 + config.max_chunk_size + TAG_LEN) as u64;
    let final_frame =
        (LENGTH_PREFIX_LEN + 1 + padded_len(tail, config.pad_block_size) + TAG_LEN) as u64;

    full_chunks
        .checked_mul(full_frame)
        .and_then(|len| len.checked_add(final_frame))
        .and_then(|len| len.checked_add((LENGTH_PREFIX_LEN + HEADER_LEN) as u64))
        .ok_or(Error::Protocol)
}

/// Encrypts an in-memory payload into a complete framed stream.
pub fn encrypt_to_vec(
    plaintext: &[u8],
    key: &SymmetricKey,
    config: &StreamConfig,
    provider: &dyn Provider,
) -> Result<Vec<u8>, Error> {
    let mut encryptor =
        StreamEncryptor::from_reader(plaintext, plaintext.len() as u64, key, config, provider)?;
    let mut ciphertext = Vec::with_capacity(encryptor.ciphertext_len() as usize);
    encryptor.copy_to(&mut ciphertext)?;
    Ok(ciphertext)
}

/// Decrypts a complete framed stream held in memory.
pub fn decrypt_to_vec(
    ciphertext: &[u8],
    key: &SymmetricKey,
    config: &StreamConfig,
) -> Result<Vec<u8>, Error> {
    let mut decryptor = StreamDecryptor::new(ciphertext, ciphertext.len() as u64, key, config)?;
    let mut plaintext = Vec::with_capacity(ciphertext.len());
    while let Some(chunk) = decryptor.read_chunk()? {
        plaintext.extend_from_slice(&chunk);
    }
    Ok(plaintext)
}
