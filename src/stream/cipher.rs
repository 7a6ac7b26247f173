use super::padding;
use crate::provider::Provider;
use crate::types::SymmetricKey;
use crate::Error;
use chacha20poly1305::aead::generic_array::GenericArray;
use chacha20poly1305::aead::stream::{DecryptorBE32, EncryptorBE32};
use chacha20poly1305::{Key, KeyInit, XChaCha20Poly1305};

/// Length of the stream header (the STREAM nonce prefix).
pub const HEADER_LEN: usize = 19;

/// Length of the Poly1305 authentication tag appended to every chunk.
pub const TAG_LEN: usize = 16;

/// Marker sealed inside every chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkTag {
    Message,
    Final,
}

impl ChunkTag {
    const MESSAGE: u8 = 0x00;
    const FINAL: u8 = 0x03;

    fn to_byte(self) -> u8 {
        match self {
            ChunkTag::Message => Self::MESSAGE,
            ChunkTag::Final => Self::FINAL,
        }
    }

    fn from_byte(byte: u8) -> Result<Self, Error> {
        match byte {
            Self::MESSAGE => Ok(ChunkTag::Message),
            Self::FINAL => Ok(ChunkTag::Final),
            _ => Err(Error::Protocol),
        }
    }
}

/// Per-stream random nonce prefix, sent in the clear ahead of the first chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamHeader([u8; HEADER_LEN]);

impl StreamHeader {
    pub(crate) fn generate(provider: &dyn Provider) -> Result<Self, Error> {
        let mut header = [0u8; HEADER_LEN];
        provider.fill_random(&mut header)?;
        Ok(Self(header))
    }

    pub fn as_bytes(&self) -> &[u8; HEADER_LEN] {
        &self.0
    }
}

impl From<[u8; HEADER_LEN]> for StreamHeader {
    fn from(bytes: [u8; HEADER_LEN]) -> Self {
        Self(bytes)
    }
}

/// Running encryption state of one stream.
///
/// The STREAM counter advances with every sealed chunk, so the sealer is
/// owned by exactly one encryptor and is neither `Clone` nor shared.
pub(crate) struct ChunkSealer {
    encryptor: EncryptorBE32<XChaCha20Poly1305>,
    associated_data: [u8; 8],
    pad_block_size: usize,
}

impl ChunkSealer {
    pub(crate) fn new(
        key: &SymmetricKey,
        header: &StreamHeader,
        stream_len: u64,
        pad_block_size: usize,
    ) -> Self {
        let aead = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
        Self {
            encryptor: EncryptorBE32::from_aead(aead, GenericArray::from_slice(&header.0)),
            associated_data: stream_len.to_le_bytes(),
            pad_block_size,
        }
    }

    /// Seals `[tag][plaintext]` into `buffer`, padding the plaintext of the final chunk.
    pub(crate) fn seal(
        &mut self,
        plaintext: &[u8],
        tag: ChunkTag,
        buffer: &mut Vec<u8>,
    ) -> Result<(), Error> {
        buffer.clear();
        buffer.push(tag.to_byte());
        buffer.extend_from_slice(plaintext);
        if tag == ChunkTag::Final {
            padding::pad(buffer, 1, self.pad_block_size);
        }

        self.encryptor
            .encrypt_next_in_place(&self.associated_data, buffer)?;
        Ok(())
    }
}

/// Running decryption state of one stream.
pub(crate) struct ChunkOpener {
    decryptor: DecryptorBE32<XChaCha20Poly1305>,
    associated_data: [u8; 8],
}

impl ChunkOpener {
    pub(crate) fn new(key: &SymmetricKey, header: &StreamHeader, stream_len: u64) -> Self {
        let aead = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
        Self {
            decryptor: DecryptorBE32::from_aead(aead, GenericArray::from_slice(&header.0)),
            associated_data: stream_len.to_le_bytes(),
        }
    }

    /// Authenticates and decrypts a chunk in place, leaving `[tag][padded plaintext]`.
    pub(crate) fn open(&mut self, buffer: &mut Vec<u8>) -> Result<ChunkTag, Error> {
        self.decryptor
            .decrypt_next_in_place(&self.associated_data, buffer)?;

        match buffer.first() {
            Some(&byte) => ChunkTag::from_byte(byte),
            None => Err(Error::Protocol),
        }
    }
}
