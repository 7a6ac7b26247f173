use super::cipher::{ChunkSealer, ChunkTag, StreamHeader};
use super::frame::write_frame;
use super::ciphertext_len;
use crate::config::StreamConfig;
use crate::provider::Provider;
use crate::types::SymmetricKey;
use crate::Error;
use std::io::{self, Read, Write};
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};
use zeroize::Zeroize;

/// Receives `consumed / total` after the header and after every chunk.
pub type ProgressCallback = Box<dyn FnMut(f64) + Send>;

type OpenSource<R> = Box<dyn FnOnce() -> io::Result<R> + Send>;
type OpenSourceFuture<R> = Pin<Box<dyn Future<Output = io::Result<R>> + Send>>;

enum Phase {
    Header,
    Body,
    Done,
}

enum Step {
    Header,
    Chunk { len: usize, tag: ChunkTag },
    Done,
}

/// State shared by the blocking and async encryptors.
///
/// A read arms `poisoned` before touching the source and clears it only once
/// the frame is complete, so an error or a cancelled future leaves the
/// instance unusable instead of half-advanced.
struct EncryptCore {
    header: StreamHeader,
    sealer: ChunkSealer,
    config: StreamConfig,
    total_len: u64,
    stream_len: u64,
    consumed: u64,
    chunks: u64,
    phase: Phase,
    poisoned: bool,
    plaintext: Vec<u8>,
    sealed: Vec<u8>,
    progress: Option<ProgressCallback>,
}

impl EncryptCore {
    fn new(
        total_len: u64,
        key: &SymmetricKey,
        config: &StreamConfig,
        provider: &dyn Provider,
    ) -> Result<Self, Error> {
        let stream_len = ciphertext_len(total_len, config)?;
        let header = StreamHeader::generate(provider)?;
        let sealer = ChunkSealer::new(key, &header, stream_len, config.pad_block_size);
        debug!(total_len, stream_len, "starting stream encryption");

        Ok(Self {
            header,
            sealer,
            config: *config,
            total_len,
            stream_len,
            consumed: 0,
            chunks: 0,
            phase: Phase::Header,
            poisoned: false,
            plaintext: Vec::with_capacity(config.max_chunk_size),
            sealed: Vec::with_capacity(config.max_sealed_chunk_len()),
            progress: None,
        })
    }

    fn begin(&mut self, buf_len: usize) -> Result<Step, Error> {
        if self.poisoned {
            return Err(Error::Poisoned);
        }
        let step = match self.phase {
            Phase::Header => Step::Header,
            Phase::Done => return Ok(Step::Done),
            Phase::Body => {
                let remaining = self.total_len - self.consumed;
                let len = usize::try_from(remaining)
                    .map_or(self.config.max_chunk_size, |r| r.min(self.config.max_chunk_size));
                let tag = if remaining == len as u64 {
                    ChunkTag::Final
                } else {
                    ChunkTag::Message
                };
                Step::Chunk { len, tag }
            }
        };

        // Checked after `Done` so reads past the end return 0 with any buffer
        let required = self.config.min_buffer_size();
        if buf_len < required {
            return Err(Error::SizeViolation {
                required,
                actual: buf_len,
            });
        }

        self.poisoned = true;
        Ok(step)
    }

    fn write_header(&mut self, out: &mut [u8]) -> Result<usize, Error> {
        let written = write_frame(out, self.header.as_bytes())?;
        self.phase = Phase::Body;
        self.poisoned = false;
        self.report_progress();
        Ok(written)
    }

    fn plaintext_buffer(&mut self, len: usize) -> &mut [u8] {
        self.plaintext.resize(len, 0);
        &mut self.plaintext[..len]
    }

    fn seal_chunk(&mut self, tag: ChunkTag, out: &mut [u8]) -> Result<usize, Error> {
        self.sealer.seal(&self.plaintext, tag, &mut self.sealed)?;
        let written = write_frame(out, &self.sealed)?;

        self.consumed += self.plaintext.len() as u64;
        self.chunks += 1;
        trace!(chunk = self.chunks, len = written, "sealed chunk");

        if tag == ChunkTag::Final {
            self.phase = Phase::Done;
            self.plaintext.zeroize();
            debug!(chunks = self.chunks, stream_len = self.stream_len, "stream encryption finished");
        }
        self.poisoned = false;
        self.report_progress();
        Ok(written)
    }

    fn report_progress(&mut self) {
        if let Some(progress) = self.progress.as_mut() {
            let fraction = if self.total_len == 0 {
                if matches!(self.phase, Phase::Done) { 1.0 } else { 0.0 }
            } else {
                self.consumed as f64 / self.total_len as f64
            };
            progress(fraction);
        }
    }
}

impl Drop for EncryptCore {
    fn drop(&mut self) {
        self.plaintext.zeroize();
        self.sealed.zeroize();
    }
}

enum Source<R> {
    Pending(OpenSource<R>),
    Open(R),
    Closed,
}

impl<R: Read> Source<R> {
    fn get(&mut self) -> Result<&mut R, Error> {
        match std::mem::replace(self, Source::Closed) {
            Source::Pending(open) => *self = Source::Open(open()?),
            other => *self = other,
        }
        match self {
            Source::Open(reader) => Ok(reader),
            _ => Err(Error::Poisoned),
        }
    }
}

/// Blocking encryptor turning a plaintext source into a framed ciphertext stream.
///
/// The first [`read`](Self::read) yields the header frame, every later one a
/// single chunk frame, and 0 once the final chunk has been produced.
pub struct StreamEncryptor<R> {
    source: Source<R>,
    core: EncryptCore,
}

impl<R: Read> StreamEncryptor<R> {
    /// Creates an encryptor whose source is opened on the first chunk read.
    ///
    /// `total_len` must be the exact number of bytes the source yields.
    pub fn new<F>(
        open: F,
        total_len: u64,
        key: &SymmetricKey,
        config: &StreamConfig,
        provider: &dyn Provider,
    ) -> Result<Self, Error>
    where
        F: FnOnce() -> io::Result<R> + Send + 'static,
    {
        Ok(Self {
            source: Source::Pending(Box::new(open)),
            core: EncryptCore::new(total_len, key, config, provider)?,
        })
    }

    /// Creates an encryptor over an already open reader.
    pub fn from_reader(
        reader: R,
        total_len: u64,
        key: &SymmetricKey,
        config: &StreamConfig,
        provider: &dyn Provider,
    ) -> Result<Self, Error> {
        Ok(Self {
            source: Source::Open(reader),
            core: EncryptCore::new(total_len, key, config, provider)?,
        })
    }

    pub fn with_progress(mut self, progress: impl FnMut(f64) + Send + 'static) -> Self {
        self.core.progress = Some(Box::new(progress));
        self
    }

    /// Total number of ciphertext bytes this encryptor will produce.
    pub fn ciphertext_len(&self) -> u64 {
        self.core.stream_len
    }

    pub fn min_buffer_size(&self) -> usize {
        self.core.config.min_buffer_size()
    }

    /// Writes the next frame into `buf`, returning its size or 0 at end of stream.
    ///
    /// `buf` must hold at least [`min_buffer_size`](Self::min_buffer_size) bytes.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        match self.core.begin(buf.len())? {
            Step::Done => Ok(0),
            Step::Header => self.core.write_header(buf),
            Step::Chunk { len, tag } => {
                let source = self.source.get()?;
                source.read_exact(self.core.plaintext_buffer(len))?;
                if tag == ChunkTag::Final {
                    ensure_exhausted(source)?;
                    self.source = Source::Closed;
                }
                self.core.seal_chunk(tag, buf)
            }
        }
    }

    /// Returns the next frame as an owned buffer, or `None` at end of stream.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, Error> {
        let mut frame = vec![0u8; self.min_buffer_size()];
        let written = self.read(&mut frame)?;
        if written == 0 {
            return Ok(None);
        }
        frame.truncate(written);
        Ok(Some(frame))
    }

    /// Writes every remaining frame to `sink` and returns the bytes written.
    pub fn copy_to<W: Write>(&mut self, sink: &mut W) -> Result<u64, Error> {
        let mut frame = vec![0u8; self.min_buffer_size()];
        let mut copied = 0u64;
        loop {
            let written = self.read(&mut frame)?;
            if written == 0 {
                return Ok(copied);
            }
            sink.write_all(&frame[..written])?;
            copied += written as u64;
        }
    }
}

fn ensure_exhausted<R: Read>(source: &mut R) -> Result<(), Error> {
    let mut extra = [0u8; 1];
    loop {
        match source.read(&mut extra) {
            Ok(0) => return Ok(()),
            Ok(_) => return Err(Error::Protocol),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
}

enum AsyncSource<R> {
    Pending(OpenSourceFuture<R>),
    Open(R),
    Closed,
}

impl<R: AsyncRead + Unpin> AsyncSource<R> {
    async fn get(&mut self) -> Result<&mut R, Error> {
        match std::mem::replace(self, AsyncSource::Closed) {
            AsyncSource::Pending(open) => *self = AsyncSource::Open(open.await?),
            other => *self = other,
        }
        match self {
            AsyncSource::Open(reader) => Ok(reader),
            _ => Err(Error::Poisoned),
        }
    }
}

/// Async counterpart of [`StreamEncryptor`].
///
/// Dropping a pending [`read`](Self::read) future is terminal: the next read
/// fails with [`Error::Poisoned`].
pub struct AsyncStreamEncryptor<R> {
    source: AsyncSource<R>,
    core: EncryptCore,
}

impl<R: AsyncRead + Unpin> AsyncStreamEncryptor<R> {
    /// Creates an encryptor whose source is opened by awaiting `open` on the first chunk read.
    pub fn new<F>(
        open: F,
        total_len: u64,
        key: &SymmetricKey,
        config: &StreamConfig,
        provider: &dyn Provider,
    ) -> Result<Self, Error>
    where
        F: Future<Output = io::Result<R>> + Send + 'static,
    {
        Ok(Self {
            source: AsyncSource::Pending(Box::pin(open)),
            core: EncryptCore::new(total_len, key, config, provider)?,
        })
    }

    pub fn from_reader(
        reader: R,
        total_len: u64,
        key: &SymmetricKey,
        config: &StreamConfig,
        provider: &dyn Provider,
    ) -> Result<Self, Error> {
        Ok(Self {
            source: AsyncSource::Open(reader),
            core: EncryptCore::new(total_len, key, config, provider)?,
        })
    }

    pub fn with_progress(mut self, progress: impl FnMut(f64) + Send + 'static) -> Self {
        self.core.progress = Some(Box::new(progress));
        self
    }

    pub fn ciphertext_len(&self) -> u64 {
        self.core.stream_len
    }

    pub fn min_buffer_size(&self) -> usize {
        self.core.config.min_buffer_size()
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        match self.core.begin(buf.len())? {
            Step::Done => Ok(0),
            Step::Header => self.core.write_header(buf),
            Step::Chunk { len, tag } => {
                let source = self.source.get().await?;
                source.read_exact(self.core.plaintext_buffer(len)).await?;
                if tag == ChunkTag::Final {
                    let mut extra = [0u8; 1];
                    if source.read(&mut extra).await? != 0 {
                        return Err(Error::Protocol);
                    }
                    self.source = AsyncSource::Closed;
                }
                self.core.seal_chunk(tag, buf)
            }
        }
    }

    pub async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, Error> {
        let mut frame = vec![0u8; self.min_buffer_size()];
        let written = self.read(&mut frame).await?;
        if written == 0 {
            return Ok(None);
        }
        frame.truncate(written);
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SystemProvider;
    use crate::stream::decrypt_to_vec;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn config() -> StreamConfig {
        StreamConfig {
            max_chunk_size: 64,
            pad_block_size: 16,
            max_frame_size: 1024,
        }
    }

    fn key() -> SymmetricKey {
        SymmetricKey::from([1u8; 32])
    }

    #[test]
    fn test_small_buffer_fails_before_any_work() {
        let opened = Arc::new(AtomicBool::new(false));
        let flag = opened.clone();
        let mut encryptor = StreamEncryptor::new(
            move || {
                flag.store(true, Ordering::SeqCst);
                Ok(Cursor::new(vec![0u8; 10]))
            },
            10,
            &key(),
            &config(),
            &SystemProvider,
        )
        .unwrap();

        let required = encryptor.min_buffer_size();
        let mut small = vec![0u8; required - 1];
        assert_eq!(
            encryptor.read(&mut small),
            Err(Error::SizeViolation {
                required,
                actual: required - 1
            })
        );

        // Still usable with a correctly sized buffer
        let mut buf = vec![0u8; required];
        assert!(encryptor.read(&mut buf).unwrap() > 0);
        assert!(!opened.load(Ordering::SeqCst), "header read must not open the source");
        assert!(encryptor.read(&mut buf).unwrap() > 0);
        assert!(opened.load(Ordering::SeqCst));
    }

    #[test]
    fn test_reads_past_end_return_zero() {
        let mut encryptor =
            StreamEncryptor::from_reader(&b"hello"[..], 5, &key(), &config(), &SystemProvider)
                .unwrap();

        let mut frames = 0;
        while encryptor.next_frame().unwrap().is_some() {
            frames += 1;
        }
        assert_eq!(frames, 2);
        assert_eq!(encryptor.next_frame().unwrap(), None);
        assert_eq!(encryptor.next_frame().unwrap(), None);
    }

    #[test]
    fn test_reads_past_end_ignore_the_buffer_size() {
        let mut encryptor =
            StreamEncryptor::from_reader(&b"hello"[..], 5, &key(), &config(), &SystemProvider)
                .unwrap();
        let mut sink = Vec::new();
        encryptor.copy_to(&mut sink).unwrap();

        assert_eq!(encryptor.read(&mut [0u8; 1]), Ok(0));
        assert_eq!(encryptor.read(&mut []), Ok(0));
    }

    #[test]
    fn test_progress_is_monotonic() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let plaintext = vec![7u8; 200];

        let mut encryptor =
            StreamEncryptor::from_reader(plaintext.as_slice(), 200, &key(), &config(), &SystemProvider)
                .unwrap()
                .with_progress(move |fraction| sink.lock().unwrap().push(fraction));
        let mut ciphertext = Vec::new();
        encryptor.copy_to(&mut ciphertext).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.first(), Some(&0.0));
        assert_eq!(seen.last(), Some(&1.0));
        assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
        // Header plus four chunks
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn test_short_source_is_a_protocol_violation() {
        let mut encryptor =
            StreamEncryptor::from_reader(&b"short"[..], 100, &key(), &config(), &SystemProvider)
                .unwrap();
        let mut sink = Vec::new();

        assert_eq!(encryptor.copy_to(&mut sink), Err(Error::Protocol));
        assert_eq!(encryptor.next_frame(), Err(Error::Poisoned));
    }

    #[test]
    fn test_long_source_is_a_protocol_violation() {
        let mut encryptor =
            StreamEncryptor::from_reader(&b"longer than said"[..], 4, &key(), &config(), &SystemProvider)
                .unwrap();
        let mut sink = Vec::new();

        assert_eq!(encryptor.copy_to(&mut sink), Err(Error::Protocol));
    }

    #[test]
    fn test_failed_open_poisons_the_stream() {
        let mut encryptor = StreamEncryptor::<Cursor<Vec<u8>>>::new(
            || Err(io::Error::new(io::ErrorKind::NotFound, "missing")),
            10,
            &key(),
            &config(),
            &SystemProvider,
        )
        .unwrap();

        assert!(encryptor.next_frame().unwrap().is_some());
        assert!(matches!(encryptor.next_frame(), Err(Error::Io(_))));
        assert_eq!(encryptor.next_frame(), Err(Error::Poisoned));
    }

    #[tokio::test]
    async fn test_async_encryptor_matches_blocking_decoder() {
        let plaintext: Vec<u8> = (0..1000u32).map(|i| i as u8).collect();
        let source = plaintext.clone();
        let mut encryptor = AsyncStreamEncryptor::new(
            async move { Ok::<_, io::Error>(Cursor::new(source)) },
            plaintext.len() as u64,
            &key(),
            &config(),
            &SystemProvider,
        )
        .unwrap();

        let mut ciphertext = Vec::new();
        while let Some(frame) = encryptor.next_frame().await.unwrap() {
            ciphertext.extend_from_slice(&frame);
        }

        assert_eq!(ciphertext.len() as u64, encryptor.ciphertext_len());
        assert_eq!(decrypt_to_vec(&ciphertext, &key(), &config()).unwrap(), plaintext);
    }

    #[tokio::test]
    async fn test_cancelled_read_is_terminal() {
        let (reader, _writer) = tokio::io::duplex(64);
        let mut encryptor =
            AsyncStreamEncryptor::from_reader(reader, 10, &key(), &config(), &SystemProvider)
                .unwrap();
        let mut buf = vec![0u8; encryptor.min_buffer_size()];

        // Header needs no input
        assert!(encryptor.read(&mut buf).await.unwrap() > 0);

        // The chunk read blocks on the empty duplex; poll it once and drop it
        {
            let mut pending = std::pin::pin!(encryptor.read(&mut buf));
            let polled = std::future::poll_fn(|cx| {
                std::task::Poll::Ready(pending.as_mut().poll(cx).is_pending())
            })
            .await;
            assert!(polled);
        }

        assert_eq!(encryptor.read(&mut buf).await, Err(Error::Poisoned));
    }
}
