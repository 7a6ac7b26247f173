//! Long-term identity keys sealed under a password-derived credential key.

use crate::password::VersionedCredentialKey;
use crate::provider::Provider;
use crate::signing::SigningKeyPair;
use crate::types::KeyExchangeKeyPair;
use crate::Error;
use aes_gcm_siv::aead::{Aead, Payload};
use aes_gcm_siv::{Aes256GcmSiv, KeyInit, Nonce};
use tracing::{debug, warn};
use zeroize::Zeroize;

const AAD_PREFIX: &[u8] = b"sealpost-identity-v1";

pub const SEALED_NONCE_LEN: usize = 12;

/// A user's long-term key material.
#[derive(Clone)]
pub struct IdentityKeys {
    pub exchange: KeyExchangeKeyPair,
    pub signing: SigningKeyPair,
}

impl IdentityKeys {
    pub fn generate(provider: &dyn Provider) -> Result<Self, Error> {
        Ok(Self {
            exchange: KeyExchangeKeyPair::generate(provider)?,
            signing: SigningKeyPair::generate(provider)?,
        })
    }

    fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(self.exchange.secret_bytes());
        bytes[32..].copy_from_slice(self.signing.secret_bytes());
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != 64 {
            return Err(Error::Serde(format!(
                "Expected 64 bytes of key material, got {}",
                bytes.len()
            )));
        }
        let mut exchange = [0u8; 32];
        let mut signing = [0u8; 32];
        exchange.copy_from_slice(&bytes[..32]);
        signing.copy_from_slice(&bytes[32..]);

        let keys = Self {
            exchange: KeyExchangeKeyPair::from_secret_bytes(exchange),
            signing: SigningKeyPair::from_secret_bytes(signing),
        };
        exchange.zeroize();
        signing.zeroize();
        Ok(keys)
    }
}

/// [`IdentityKeys`] encrypted with AES-256-GCM-SIV for storage on an
/// untrusted server.
///
/// The credential-key version is authenticated, so a key derived with a
/// different password version is told apart from a wrong password.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedIdentity {
    pub(crate) version: u32,
    pub(crate) nonce: [u8; SEALED_NONCE_LEN],
    pub(crate) ciphertext: Vec<u8>,
}

impl SealedIdentity {
    pub fn seal(
        keys: &IdentityKeys,
        credential_key: &VersionedCredentialKey,
        provider: &dyn Provider,
    ) -> Result<Self, Error> {
        let mut nonce = [0u8; SEALED_NONCE_LEN];
        provider.fill_random(&mut nonce)?;

        let version = credential_key.version();
        let mut plaintext = keys.to_bytes();
        let result = cipher(credential_key).encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: &plaintext,
                aad: &associated_data(version),
            },
        );
        plaintext.zeroize();
        debug!(version, "sealed identity keys");

        Ok(Self {
            version,
            nonce,
            ciphertext: result?,
        })
    }

    /// Decrypts the identity with the credential key of the matching version.
    pub fn open(&self, credential_key: &VersionedCredentialKey) -> Result<IdentityKeys, Error> {
        if credential_key.version() != self.version {
            return Err(Error::VersionMismatch);
        }

        let mut plaintext = cipher(credential_key)
            .decrypt(
                Nonce::from_slice(&self.nonce),
                Payload {
                    msg: &self.ciphertext,
                    aad: &associated_data(self.version),
                },
            )
            .inspect_err(|_| warn!("sealed identity failed authentication"))?;

        let keys = IdentityKeys::from_bytes(&plaintext);
        plaintext.zeroize();
        keys
    }

    /// Password version of the credential key that sealed this identity.
    pub fn version(&self) -> u32 {
        self.version
    }
}

fn cipher(credential_key: &VersionedCredentialKey) -> Aes256GcmSiv {
    let key = aes_gcm_siv::Key::<Aes256GcmSiv>::from_slice(credential_key.key().as_bytes());
    Aes256GcmSiv::new(key)
}

fn associated_data(version: u32) -> Vec<u8> {
    let mut aad = Vec::with_capacity(AAD_PREFIX.len() + 4);
    aad.extend_from_slice(AAD_PREFIX);
    aad.extend_from_slice(&version.to_le_bytes());
    aad
}
