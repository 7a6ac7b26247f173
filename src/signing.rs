//! Ed25519 signatures over whole messages and over streamed payloads.
//!
//! Payloads are signed with Ed25519ph: the signer and verifier feed bytes
//! into a SHA-512 prehash as they pass through, so a file of any size is
//! signed and verified in bounded memory.

use crate::provider::Provider;
use crate::types::encoding;
use crate::Error;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use sha2::{Digest, Sha512};

/// Domain separation context for payload signatures.
const PAYLOAD_CONTEXT: &[u8] = b"sealpost-payload-v1";

pub const SIGNATURE_LEN: usize = 64;

/// Ed25519 key pair owned by a sender.
#[derive(Clone)]
pub struct SigningKeyPair {
    signing_key: SigningKey,
}

impl SigningKeyPair {
    pub fn generate(provider: &dyn Provider) -> Result<Self, Error> {
        let seed = provider.random_seed()?;
        Ok(Self::from_secret_bytes(seed))
    }

    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&bytes),
        }
    }

    pub(crate) fn secret_bytes(&self) -> &[u8; 32] {
        self.signing_key.as_bytes()
    }

    pub fn public_key(&self) -> SigningPublicKey {
        SigningPublicKey(self.signing_key.verifying_key())
    }

    /// Signs a complete message with plain Ed25519.
    pub fn sign(&self, message: &[u8]) -> DetachedSignature {
        DetachedSignature(self.signing_key.sign(message))
    }
}

/// Public half of a [`SigningKeyPair`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SigningPublicKey(VerifyingKey);

impl SigningPublicKey {
    /// Parses a compressed Edwards point; invalid encodings are rejected.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, Error> {
        Ok(Self(VerifyingKey::from_bytes(bytes)?))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    pub fn to_base64(&self) -> String {
        encoding::encode(self.as_bytes())
    }

    pub fn from_base64(encoded: &str) -> Result<Self, Error> {
        Self::from_bytes(&encoding::decode_array::<32>(encoded)?)
    }

    /// Strict Ed25519 verification of a complete message.
    ///
    /// Weak keys and non-canonical signatures are rejected.
    pub fn verify(&self, message: &[u8], signature: &DetachedSignature) -> Result<(), Error> {
        self.0.verify_strict(message, &signature.0)?;
        Ok(())
    }
}

/// A 64-byte Ed25519 signature sent alongside the data it covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DetachedSignature(Signature);

impl DetachedSignature {
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        self.0.to_bytes()
    }

    pub fn to_base64(&self) -> String {
        encoding::encode(&self.to_bytes())
    }

    pub fn from_base64(encoded: &str) -> Result<Self, Error> {
        encoding::decode_array::<SIGNATURE_LEN>(encoded).map(Self::from)
    }
}

impl From<[u8; SIGNATURE_LEN]> for DetachedSignature {
    fn from(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(Signature::from_bytes(&bytes))
    }
}

/// Incrementally signs a payload as it is produced.
#[derive(Clone, Default)]
pub struct PayloadSigner {
    prehash: Sha512,
}

impl PayloadSigner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.prehash.update(data);
    }

    pub fn finalize(self, keys: &SigningKeyPair) -> Result<DetachedSignature, Error> {
        let signature = keys
            .signing_key
            .sign_prehashed(self.prehash, Some(PAYLOAD_CONTEXT))?;
        Ok(DetachedSignature(signature))
    }
}

/// Incrementally verifies a payload as it is consumed.
#[derive(Clone, Default)]
pub struct PayloadVerifier {
    prehash: Sha512,
}

impl PayloadVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.prehash.update(data);
    }

    /// Fails with [`Error::Crypto`] unless `signature` covers every byte fed in.
    pub fn verify(
        self,
        public_key: &SigningPublicKey,
        signature: &DetachedSignature,
    ) -> Result<(), Error> {
        public_key
            .0
            .verify_prehashed_strict(self.prehash, Some(PAYLOAD_CONTEXT), &signature.0)?;
        Ok(())
    }
}
