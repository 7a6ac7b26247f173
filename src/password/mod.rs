//! Versioned derivation of login codes and credential keys from a password.
//!
//! Every version produces a 32-byte master secret from the lower-cased
//! username and the verbatim password, then expands it with HKDF-SHA-256 into
//! an authentication code (sent to the server) and a credential key (kept
//! locally). The version travels with the derived bytes so a verifier always
//! knows which algorithm to replay.

mod fallback;
pub use fallback::PasswordChange;

use crate::config::PasswordConfig;
use crate::types::{SymmetricKey, encoding};
use crate::Error;
use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Newest derivation version; all new passwords use it.
pub const CURRENT_PASSWORD_VERSION: u32 = 1;

const LEGACY_DOMAIN: &[u8] = b"sealpost-password-v0";
const SALT_DOMAIN: &[u8] = b"sealpost-password-salt";
const AUTH_CODE_INFO: &[u8] = b"sealpost-password-auth-code";
const CREDENTIAL_KEY_INFO: &[u8] = b"sealpost-password-credential-key";
const SALT_LEN: usize = 16;

/// Authentication code derived from a password, tagged with its version.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VersionedPassword {
    bytes: [u8; 32],
    version: u32,
}

impl VersionedPassword {
    /// Rebuilds a stored code, e.g. on the server side.
    pub fn new(bytes: [u8; 32], version: u32) -> Self {
        Self { bytes, version }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn to_base64(&self) -> String {
        encoding::encode(&self.bytes)
    }

    /// Compares a submitted code with the stored one in constant time.
    ///
    /// A version difference is reported as [`Error::VersionMismatch`] so the
    /// client can fall back to an older derivation.
    pub fn verify_against(&self, stored: &VersionedPassword) -> Result<(), Error> {
        if self.version != stored.version {
            return Err(Error::VersionMismatch);
        }
        if bool::from(self.bytes.ct_eq(&stored.bytes)) {
            Ok(())
        } else {
            Err(Error::Crypto)
        }
    }
}

impl std::fmt::Debug for VersionedPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedPassword")
            .field("bytes", &"[REDACTED]")
            .field("version", &self.version)
            .finish()
    }
}

/// Locally retained key derived alongside a [`VersionedPassword`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionedCredentialKey {
    key: SymmetricKey,
    version: u32,
}

impl VersionedCredentialKey {
    pub fn new(key: SymmetricKey, version: u32) -> Self {
        Self { key, version }
    }

    pub fn key(&self) -> &SymmetricKey {
        &self.key
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

/// Both outputs of one derivation.
pub struct DerivedCredentials {
    password: VersionedPassword,
    credential_key: VersionedCredentialKey,
}

impl DerivedCredentials {
    pub fn password(&self) -> &VersionedPassword {
        &self.password
    }

    pub fn credential_key(&self) -> &VersionedCredentialKey {
        &self.credential_key
    }

    pub fn version(&self) -> u32 {
        self.password.version
    }
}

/// Derives credentials for every supported version.
#[derive(Clone, Debug)]
pub struct PasswordService {
    params: Params,
}

impl PasswordService {
    /// Fails with [`Error::Config`] if the Argon2 parameters are rejected.
    pub fn new(config: &PasswordConfig) -> Result<Self, Error> {
        Ok(Self {
            params: config.argon2_params()?,
        })
    }

    /// Replays the algorithm of `version` for `username` and `password`.
    pub fn derive(
        &self,
        username: &str,
        password: &str,
        version: u32,
    ) -> Result<DerivedCredentials, Error> {
        let username = username.to_lowercase();
        let mut master = match version {
            0 => legacy_master_secret(&username, password)?,
            1 => self.master_secret(&username, password)?,
            _ => return Err(Error::UnsupportedVersion(version)),
        };

        let hkdf = Hkdf::<Sha256>::new(None, &master);
        master.zeroize();

        let mut auth_code = [0u8; 32];
        let mut credential_key = [0u8; 32];
        hkdf.expand(AUTH_CODE_INFO, &mut auth_code)
            .map_err(|_| Error::Crypto)?;
        hkdf.expand(CREDENTIAL_KEY_INFO, &mut credential_key)
            .map_err(|_| Error::Crypto)?;
        debug!(version, "derived password credentials");

        let credentials = DerivedCredentials {
            password: VersionedPassword::new(auth_code, version),
            credential_key: VersionedCredentialKey::new(SymmetricKey::from(credential_key), version),
        };
        auth_code.zeroize();
        credential_key.zeroize();
        Ok(credentials)
    }

    fn master_secret(&self, username: &str, password: &str) -> Result<[u8; 32], Error> {
        let digest = Sha256::new()
            .chain_update(SALT_DOMAIN)
            .chain_update(username.as_bytes())
            .finalize();
        let salt = &digest[..SALT_LEN];

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone());
        let mut master = [0u8; 32];
        argon2.hash_password_into(password.as_bytes(), salt, &mut master)?;
        Ok(master)
    }
}

fn legacy_master_secret(username: &str, password: &str) -> Result<[u8; 32], Error> {
    let mut digest = Sha256::new()
        .chain_update(LEGACY_DOMAIN)
        .chain_update(encoding::length_prefix(username.len())?)
        .chain_update(username.as_bytes())
        .chain_update(password.as_bytes())
        .finalize();

    let mut master = [0u8; 32];
    master.copy_from_slice(&digest);
    digest.as_mut_slice().zeroize();
    Ok(master)
}
