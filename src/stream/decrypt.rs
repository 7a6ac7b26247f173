use super::cipher::{ChunkOpener, ChunkTag, HEADER_LEN, StreamHeader, TAG_LEN};
use super::frame::{LENGTH_PREFIX_LEN, frame_len};
use super::padding::unpadded_len;
use crate::config::StreamConfig;
use crate::types::SymmetricKey;
use crate::Error;
use std::io::{self, Read};
use std::ops::Range;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace, warn};
use zeroize::Zeroize;

/// Smallest sealed chunk: a tag byte plus the authentication tag.
const MIN_SEALED_LEN: usize = 1 + TAG_LEN;

/// State shared by the blocking and async decryptors.
struct DecryptCore {
    opener: ChunkOpener,
    max_frame_size: usize,
    total_len: u64,
    consumed: u64,
    chunks: u64,
    finished: bool,
    poisoned: bool,
    buffer: Vec<u8>,
    pending: Range<usize>,
}

impl DecryptCore {
    fn header_len(prefix: [u8; LENGTH_PREFIX_LEN], total_len: u64) -> Result<usize, Error> {
        let len = frame_len(prefix);
        if len != HEADER_LEN || total_len < (LENGTH_PREFIX_LEN + HEADER_LEN) as u64 {
            return Err(Error::Protocol);
        }
        Ok(len)
    }

    /// The decoder only uses the frame limit; chunk and padding sizes are the sender's choice.
    fn frame_limit(config: &StreamConfig) -> Result<usize, Error> {
        if config.max_frame_size < MIN_SEALED_LEN {
            return Err(Error::Config(format!(
                "max_frame_size must be at least {MIN_SEALED_LEN}"
            )));
        }
        Ok(config.max_frame_size)
    }

    fn new(
        header: [u8; HEADER_LEN],
        total_len: u64,
        key: &SymmetricKey,
        max_frame_size: usize,
    ) -> Self {
        debug!(total_len, "starting stream decryption");
        Self {
            opener: ChunkOpener::new(key, &StreamHeader::from(header), total_len),
            max_frame_size,
            total_len,
            consumed: (LENGTH_PREFIX_LEN + HEADER_LEN) as u64,
            chunks: 0,
            finished: false,
            poisoned: false,
            buffer: Vec::new(),
            pending: 0..0,
        }
    }

    /// Returns whether another chunk must be read, arming the poison flag if so.
    fn begin(&mut self) -> Result<bool, Error> {
        if self.poisoned {
            return Err(Error::Poisoned);
        }
        if self.finished {
            return Ok(false);
        }
        self.poisoned = true;
        if self.total_len - self.consumed < LENGTH_PREFIX_LEN as u64 {
            // End of input without a final chunk
            return Err(Error::Protocol);
        }
        Ok(true)
    }

    fn frame_buffer(&mut self, prefix: [u8; LENGTH_PREFIX_LEN]) -> Result<&mut [u8], Error> {
        self.consumed += LENGTH_PREFIX_LEN as u64;
        let len = frame_len(prefix);
        if len < MIN_SEALED_LEN || len as u64 > self.total_len - self.consumed {
            return Err(Error::Protocol);
        }
        if len > self.max_frame_size {
            // A genuine sender may use larger chunks than this recipient allows
            return Err(Error::SizeViolation {
                required: len,
                actual: self.max_frame_size,
            });
        }

        self.buffer.zeroize();
        self.buffer.resize(len, 0);
        Ok(self.buffer.as_mut_slice())
    }

    fn open(&mut self) -> Result<(), Error> {
        self.consumed += self.buffer.len() as u64;
        let tag = self.opener.open(&mut self.buffer).inspect_err(|_| {
            warn!("stream chunk failed authentication");
        })?;

        let at_end = self.consumed == self.total_len;
        if at_end != (tag == ChunkTag::Final) {
            warn!("final tag does not match the end of the stream");
            return Err(Error::Protocol);
        }

        let body_len = match tag {
            ChunkTag::Final => unpadded_len(&self.buffer[1..])?,
            ChunkTag::Message => self.buffer.len() - 1,
        };

        self.chunks += 1;
        self.pending = 1..1 + body_len;
        self.finished = at_end;
        self.poisoned = false;
        trace!(chunk = self.chunks, len = body_len, "opened chunk");
        if self.finished {
            debug!(chunks = self.chunks, "stream decryption finished");
        }
        Ok(())
    }

    fn take_pending(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            return None;
        }
        let chunk = self.buffer[self.pending.clone()].to_vec();
        self.pending = 0..0;
        Some(chunk)
    }

    fn copy_pending(&mut self, out: &mut [u8]) -> usize {
        let n = self.pending.len().min(out.len());
        out[..n].copy_from_slice(&self.buffer[self.pending.start..self.pending.start + n]);
        self.pending.start += n;
        n
    }
}

impl Drop for DecryptCore {
    fn drop(&mut self) {
        self.buffer.zeroize();
    }
}

/// Blocking decryptor over a framed ciphertext stream.
///
/// The header is consumed during construction; every chunk is authenticated
/// before any of its plaintext is released.
pub struct StreamDecryptor<R> {
    source: R,
    core: DecryptCore,
}

impl<R: Read> StreamDecryptor<R> {
    /// Reads the stream header from `source` and prepares the cipher state.
    ///
    /// `total_len` is the exact ciphertext length announced by the transport.
    pub fn new(
        mut source: R,
        total_len: u64,
        key: &SymmetricKey,
        config: &StreamConfig,
    ) -> Result<Self, Error> {
        let max_frame_size = DecryptCore::frame_limit(config)?;

        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        source.read_exact(&mut prefix)?;
        DecryptCore::header_len(prefix, total_len)?;

        let mut header = [0u8; HEADER_LEN];
        source.read_exact(&mut header)?;

        Ok(Self {
            source,
            core: DecryptCore::new(header, total_len, key, max_frame_size),
        })
    }

    /// Whether the final chunk has been authenticated.
    pub fn is_finished(&self) -> bool {
        self.core.finished
    }

    /// Returns the plaintext of the next chunk, or `None` after the final one.
    pub fn read_chunk(&mut self) -> Result<Option<Vec<u8>>, Error> {
        if let Some(chunk) = self.core.take_pending() {
            return Ok(Some(chunk));
        }
        while self.next()? {
            if let Some(chunk) = self.core.take_pending() {
                return Ok(Some(chunk));
            }
        }
        Ok(None)
    }

    fn next(&mut self) -> Result<bool, Error> {
        if !self.core.begin()? {
            return Ok(false);
        }
        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        self.source.read_exact(&mut prefix)?;
        self.source.read_exact(self.core.frame_buffer(prefix)?)?;
        self.core.open()?;
        Ok(true)
    }
}

impl<R: Read> Read for StreamDecryptor<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.core.pending.is_empty() {
            if !self.next().map_err(io::Error::other)? {
                return Ok(0);
            }
        }
        Ok(self.core.copy_pending(buf))
    }
}

/// Async counterpart of [`StreamDecryptor`].
///
/// Dropping a pending [`read_chunk`](Self::read_chunk) future is terminal:
/// the next call fails with [`Error::Poisoned`].
pub struct AsyncStreamDecryptor<R> {
    source: R,
    core: DecryptCore,
}

impl<R: AsyncRead + Unpin> AsyncStreamDecryptor<R> {
    pub async fn new(
        mut source: R,
        total_len: u64,
        key: &SymmetricKey,
        config: &StreamConfig,
    ) -> Result<Self, Error> {
        let max_frame_size = DecryptCore::frame_limit(config)?;

        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        source.read_exact(&mut prefix).await?;
        DecryptCore::header_len(prefix, total_len)?;

        let mut header = [0u8; HEADER_LEN];
        source.read_exact(&mut header).await?;

        Ok(Self {
            source,
            core: DecryptCore::new(header, total_len, key, max_frame_size),
        })
    }

    pub fn is_finished(&self) -> bool {
        self.core.finished
    }

    pub async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>, Error> {
        if let Some(chunk) = self.core.take_pending() {
            return Ok(Some(chunk));
        }
        while self.core.begin()? {
            let mut prefix = [0u8; LENGTH_PREFIX_LEN];
            self.source.read_exact(&mut prefix).await?;
            self.source
                .read_exact(self.core.frame_buffer(prefix)?)
                .await?;
            self.core.open()?;
            if let Some(chunk) = self.core.take_pending() {
                return Ok(Some(chunk));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SystemProvider;
    use crate::stream::cipher::ChunkSealer;
    use crate::stream::encrypt_to_vec;
    use crate::stream::frame::write_frame;

    fn config() -> StreamConfig {
        StreamConfig {
            max_chunk_size: 100,
            pad_block_size: 8,
            max_frame_size: 1024,
        }
    }

    fn key() -> SymmetricKey {
        SymmetricKey::from([5u8; 32])
    }

    fn sealed(len: usize) -> (Vec<u8>, Vec<u8>) {
        let plaintext: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();
        let ciphertext = encrypt_to_vec(&plaintext, &key(), &config(), &SystemProvider).unwrap();
        (plaintext, ciphertext)
    }

    #[test]
    fn test_header_is_read_on_construction() {
        let (_, ciphertext) = sealed(10);

        // A source holding only the header frame is enough to construct
        let header_only = &ciphertext[..LENGTH_PREFIX_LEN + HEADER_LEN];
        let mut decryptor =
            StreamDecryptor::new(header_only, ciphertext.len() as u64, &key(), &config()).unwrap();
        assert!(!decryptor.is_finished());
        assert_eq!(decryptor.read_chunk(), Err(Error::Protocol));

        // Missing header bytes
        let short = &ciphertext[..LENGTH_PREFIX_LEN + 3];
        assert!(matches!(
            StreamDecryptor::new(short, ciphertext.len() as u64, &key(), &config()),
            Err(Error::Protocol)
        ));
    }

    #[test]
    fn test_bad_header_length_prefix() {
        let (_, mut ciphertext) = sealed(10);
        ciphertext[0] = 20;

        assert!(matches!(
            StreamDecryptor::new(ciphertext.as_slice(), ciphertext.len() as u64, &key(), &config()),
            Err(Error::Protocol)
        ));
    }

    #[test]
    fn test_oversized_frame_length_is_rejected_without_allocation() {
        let (_, mut ciphertext) = sealed(10);
        let offset = LENGTH_PREFIX_LEN + HEADER_LEN;
        ciphertext[offset..offset + 4].copy_from_slice(&u32::MAX.to_le_bytes());

        let mut decryptor =
            StreamDecryptor::new(ciphertext.as_slice(), ciphertext.len() as u64, &key(), &config())
                .unwrap();
        assert_eq!(decryptor.read_chunk(), Err(Error::Protocol));
        assert_eq!(decryptor.read_chunk(), Err(Error::Poisoned));
    }

    /// Builds an authenticated stream from arbitrary tag sequences.
    fn forge(tags: &[ChunkTag]) -> Vec<u8> {
        let header = StreamHeader::generate(&SystemProvider).unwrap();
        let chunk_frame = LENGTH_PREFIX_LEN + 1 + 8 + TAG_LEN;
        let stream_len = LENGTH_PREFIX_LEN + HEADER_LEN + tags.len() * chunk_frame;
        let mut sealer = ChunkSealer::new(&key(), &header, stream_len as u64, 8);

        let mut stream = vec![0u8; stream_len];
        let mut offset = write_frame(&mut stream, header.as_bytes()).unwrap();
        let mut sealed = Vec::new();
        for &tag in tags {
            // Message chunks carry 8 bytes, final chunks 7 bytes padded to 8
            let plaintext: &[u8] = if tag == ChunkTag::Final { b"1234567" } else { b"12345678" };
            sealer.seal(plaintext, tag, &mut sealed).unwrap();
            offset += write_frame(&mut stream[offset..], &sealed).unwrap();
        }
        assert_eq!(offset, stream_len);
        stream
    }

    fn drain(stream: &[u8]) -> Result<usize, Error> {
        let mut decryptor =
            StreamDecryptor::new(stream, stream.len() as u64, &key(), &config())?;
        let mut chunks = 0;
        while decryptor.read_chunk()?.is_some() {
            chunks += 1;
        }
        Ok(chunks)
    }

    #[test]
    fn test_final_tag_must_coincide_with_end_of_stream() {
        use ChunkTag::{Final, Message};

        assert_eq!(drain(&forge(&[Message, Final])), Ok(2));
        // Final chunk followed by more data
        assert_eq!(drain(&forge(&[Final, Message])), Err(Error::Protocol));
        assert_eq!(drain(&forge(&[Message, Final, Final])), Err(Error::Protocol));
        // Stream ends without a final chunk
        assert_eq!(drain(&forge(&[Message, Message])), Err(Error::Protocol));
    }

    #[test]
    fn test_failed_chunk_releases_nothing() {
        let (_, mut ciphertext) = sealed(250);
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xFF;

        let mut decryptor =
            StreamDecryptor::new(ciphertext.as_slice(), ciphertext.len() as u64, &key(), &config())
                .unwrap();
        assert_eq!(decryptor.read_chunk().unwrap().unwrap().len(), 100);
        assert_eq!(decryptor.read_chunk().unwrap().unwrap().len(), 100);
        assert_eq!(decryptor.read_chunk(), Err(Error::Crypto));
        assert_eq!(decryptor.read_chunk(), Err(Error::Poisoned));
    }

    #[test]
    fn test_io_read_composes_with_copy() {
        let (plaintext, ciphertext) = sealed(1234);
        let mut decryptor =
            StreamDecryptor::new(ciphertext.as_slice(), ciphertext.len() as u64, &key(), &config())
                .unwrap();

        let mut output = Vec::new();
        io::copy(&mut decryptor, &mut output).unwrap();
        assert_eq!(output, plaintext);
    }

    #[test]
    fn test_io_read_surfaces_the_original_error() {
        let (_, mut ciphertext) = sealed(300);
        let middle = ciphertext.len() / 2;
        ciphertext[middle] ^= 0x01;

        let mut decryptor =
            StreamDecryptor::new(ciphertext.as_slice(), ciphertext.len() as u64, &key(), &config())
                .unwrap();
        let err = io::copy(&mut decryptor, &mut io::sink()).unwrap_err();
        let inner = err.into_inner().unwrap().downcast::<Error>().unwrap();
        assert!(matches!(*inner, Error::Crypto | Error::Protocol));
    }

    #[test]
    fn test_small_reads_through_io_read() {
        let (plaintext, ciphertext) = sealed(345);
        let mut decryptor =
            StreamDecryptor::new(ciphertext.as_slice(), ciphertext.len() as u64, &key(), &config())
                .unwrap();

        let mut output = Vec::new();
        let mut buf = [0u8; 7];
        loop {
            let n = decryptor.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            output.extend_from_slice(&buf[..n]);
        }
        assert_eq!(output, plaintext);
        assert!(decryptor.is_finished());
    }

    #[tokio::test]
    async fn test_async_decryptor_round_trip() {
        let (plaintext, ciphertext) = sealed(777);
        let mut decryptor = AsyncStreamDecryptor::new(
            ciphertext.as_slice(),
            ciphertext.len() as u64,
            &key(),
            &config(),
        )
        .await
        .unwrap();

        let mut output = Vec::new();
        while let Some(chunk) = decryptor.read_chunk().await.unwrap() {
            output.extend_from_slice(&chunk);
        }
        assert_eq!(output, plaintext);
        assert!(decryptor.is_finished());
        assert_eq!(decryptor.read_chunk().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cancelled_read_chunk_is_terminal() {
        use tokio::io::AsyncWriteExt;

        let (_, ciphertext) = sealed(10);
        let (reader, mut writer) = tokio::io::duplex(64);
        writer
            .write_all(&ciphertext[..LENGTH_PREFIX_LEN + HEADER_LEN])
            .await
            .unwrap();

        let mut decryptor =
            AsyncStreamDecryptor::new(reader, ciphertext.len() as u64, &key(), &config())
                .await
                .unwrap();

        // No chunk bytes are available; poll the read once and drop it
        {
            let mut pending = std::pin::pin!(decryptor.read_chunk());
            let polled = std::future::poll_fn(|cx| {
                std::task::Poll::Ready(pending.as_mut().poll(cx).is_pending())
            })
            .await;
            assert!(polled);
        }

        // Even once the rest of the stream arrives
        writer
            .write_all(&ciphertext[LENGTH_PREFIX_LEN + HEADER_LEN..])
            .await
            .unwrap();
        assert_eq!(decryptor.read_chunk().await, Err(Error::Poisoned));
        assert!(!decryptor.is_finished());
    }

    #[tokio::test]
    async fn test_async_truncation_is_detected() {
        let (_, ciphertext) = sealed(450);
        let truncated = &ciphertext[..ciphertext.len() - 10];
        let mut decryptor =
            AsyncStreamDecryptor::new(truncated, ciphertext.len() as u64, &key(), &config())
                .await
                .unwrap();

        let result = loop {
            match decryptor.read_chunk().await {
                Ok(Some(_)) => continue,
                other => break other,
            }
        };
        assert_eq!(result, Err(Error::Protocol));
    }
}
