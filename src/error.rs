/// Errors that can occur while sealing, opening or deriving key material.
///
/// Failures of the cryptographic and framing checks are deliberately opaque:
/// they never say which chunk or byte was rejected.
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum Error {
    /// A frame does not fit: the caller's buffer is too small, or a frame is
    /// larger than the decoder's `max_frame_size`.
    #[error("Buffer of {actual} bytes is smaller than the required {required} bytes")]
    SizeViolation {
        /// Bytes needed for the frame.
        required: usize,
        /// Size of the buffer or frame limit available.
        actual: usize,
    },

    /// Authentication failed: tampered data, wrong key or bad signature.
    #[error("Cryptographic operation failed")]
    Crypto,

    /// The framed stream is truncated, over-long or otherwise malformed.
    #[error("Protocol Violation")]
    Protocol,

    /// A derivation was requested for a version newer than the current one.
    #[error("Version {0} is not supported")]
    UnsupportedVersion(u32),

    /// Key material was derived with a different version than expected.
    #[error("Version mismatch")]
    VersionMismatch,

    /// The stream failed earlier or a read was cancelled mid-way.
    #[error("Stream is no longer usable")]
    Poisoned,

    /// Random number generation failed.
    #[error("Random number generation failed")]
    Random,

    /// The underlying source could not be read.
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization or deserialization failed.
    #[error("Serialization/deserialization failed: {0}")]
    Serde(String),

    /// The configuration is invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<chacha20poly1305::aead::Error> for Error {
    fn from(_: chacha20poly1305::aead::Error) -> Self {
        Self::Crypto
    }
}

impl From<ed25519_dalek::SignatureError> for Error {
    fn from(_: ed25519_dalek::SignatureError) -> Self {
        Self::Crypto
    }
}

impl From<argon2::Error> for Error {
    fn from(value: argon2::Error) -> Self {
        Self::Config(value.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        match value.kind() {
            std::io::ErrorKind::UnexpectedEof => Self::Protocol,
            _ => Self::Io(value.to_string()),
        }
    }
}

impl From<prost::DecodeError> for Error {
    fn from(value: prost::DecodeError) -> Self {
        Self::Serde(value.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(value: base64::DecodeError) -> Self {
        Self::Serde(value.to_string())
    }
}
