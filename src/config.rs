use crate::provider::{Provider, SeededProvider, SystemProvider};
use crate::stream::{HEADER_LEN, LENGTH_PREFIX_LEN, TAG_LEN, padded_len};
use crate::Error;

/// Which random source the process uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProviderKind {
    /// Operating-system CSPRNG.
    #[default]
    System,
    /// Deterministic DRBG for simulations and tests.
    Seeded(u64),
}

/// Framing parameters of the chunked stream codec.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    /// Plaintext bytes carried by every non-final chunk.
    pub max_chunk_size: usize,
    /// The final chunk is padded up to a multiple of this size.
    pub pad_block_size: usize,
    /// Largest ciphertext chunk the decoder will accept. This is a resource
    /// limit of the recipient and does not have to match the sender's chunk size.
    pub max_frame_size: usize,
}

impl StreamConfig {
    /// Ciphertext size of a full, padded chunk body.
    pub fn max_sealed_chunk_len(&self) -> usize {
        1 + padded_len(self.max_chunk_size, self.pad_block_size) + TAG_LEN
    }

    /// Smallest destination buffer the encoder accepts for a single read.
    pub fn min_buffer_size(&self) -> usize {
        HEADER_LEN + LENGTH_PREFIX_LEN + self.max_chunk_size + self.pad_block_size + TAG_LEN + 1
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.max_chunk_size == 0 {
            return Err(Error::Config("max_chunk_size must be positive".to_string()));
        }
        if self.pad_block_size == 0 {
            return Err(Error::Config("pad_block_size must be positive".to_string()));
        }
        if u32::try_from(self.max_sealed_chunk_len()).is_err() {
            return Err(Error::Config(
                "chunks must fit a 32-bit length prefix".to_string(),
            ));
        }
        if self.max_frame_size < self.max_sealed_chunk_len() {
            return Err(Error::Config(format!(
                "max_frame_size {} cannot hold a full chunk of {} bytes",
                self.max_frame_size,
                self.max_sealed_chunk_len()
            )));
        }
        Ok(())
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 64 * 1024,
            pad_block_size: 512,
            max_frame_size: 16 * 1024 * 1024,
        }
    }
}

/// Argon2id cost parameters used by the current password version.
///
/// Changing these for a deployment changes every derived password, so they
/// are fixed for the lifetime of a user base.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl PasswordConfig {
    pub(crate) fn argon2_params(&self) -> Result<argon2::Params, Error> {
        let params = argon2::Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(32),
        )?;
        Ok(params)
    }
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024, // 64 MiB
            iterations: 3,
            parallelism: 1,
        }
    }
}

/// Process-wide configuration, built once at startup and never mutated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {
    pub provider: ProviderKind,
    pub stream: StreamConfig,
    pub password: PasswordConfig,
}

impl Config {
    /// Checks every section and reports the first invalid value.
    pub fn validate(&self) -> Result<(), Error> {
        self.stream.validate()?;
        self.password.argon2_params()?;
        Ok(())
    }

    /// Builds the random source selected by [`Config::provider`].
    pub fn provider(&self) -> Box<dyn Provider> {
        match self.provider {
            ProviderKind::System => Box::new(SystemProvider),
            ProviderKind::Seeded(seed) => Box::new(SeededProvider::new(seed)),
        }
    }
}
