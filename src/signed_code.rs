//! Single-use codes for recovery and email verification.
//!
//! Each code is signed by a key pair generated for that code alone. Only the
//! public half survives issuance, so a leaked [`StoredCode`] cannot be used to
//! mint new signatures.

use crate::provider::Provider;
use crate::signing::{DetachedSignature, SigningKeyPair, SigningPublicKey};
use crate::types::encoding::length_prefix;
use crate::Error;
use subtle::{Choice, ConstantTimeEq};
use tracing::{debug, warn};

pub const CODE_LEN: usize = 16;

const CANONICAL_PREFIX: &[u8] = b"sealpost-signed-code-v1";

/// A freshly issued code with its signature, handed to the user.
pub struct SignedCode {
    code: [u8; CODE_LEN],
    signature: DetachedSignature,
    verification_key: SigningPublicKey,
}

impl SignedCode {
    /// Generates a random code bound to `username` and signs it with a
    /// throwaway key.
    pub fn issue(provider: &dyn Provider, username: &str) -> Result<Self, Error> {
        let mut code = [0u8; CODE_LEN];
        provider.fill_random(&mut code)?;

        let signer = SigningKeyPair::generate(provider)?;
        let signature = signer.sign(&canonical_bytes(&code, username)?);
        let verification_key = signer.public_key();
        drop(signer);
        debug!("issued signed code");

        Ok(Self {
            code,
            signature,
            verification_key,
        })
    }

    pub fn code(&self) -> &[u8; CODE_LEN] {
        &self.code
    }

    pub fn signature(&self) -> &DetachedSignature {
        &self.signature
    }

    /// The part the server persists until the code is used or expires.
    pub fn stored(&self) -> StoredCode {
        StoredCode {
            code: self.code,
            verification_key: self.verification_key,
        }
    }
}

/// Server-side record of an issued code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredCode {
    pub(crate) code: [u8; CODE_LEN],
    pub(crate) verification_key: SigningPublicKey,
}

impl StoredCode {
    pub fn verification_key(&self) -> &SigningPublicKey {
        &self.verification_key
    }

    /// Checks a submitted code and signature for `username`.
    ///
    /// Code equality is constant-time and the signature is always checked
    /// as well; both must hold. The error does not say which one failed.
    pub fn verify(
        &self,
        username: &str,
        supplied_code: &[u8; CODE_LEN],
        signature: &DetachedSignature,
    ) -> Result<(), Error> {
        let code_matches = self.code.ct_eq(supplied_code);
        let signature_valid = canonical_bytes(&self.code, username)
            .and_then(|bytes| self.verification_key.verify(&bytes, signature))
            .is_ok();

        if bool::from(code_matches & Choice::from(u8::from(signature_valid))) {
            Ok(())
        } else {
            warn!("signed code rejected");
            Err(Error::Crypto)
        }
    }
}

/// `prefix ‖ code ‖ u32 LE len ‖ lowercase(username)`
fn canonical_bytes(code: &[u8; CODE_LEN], username: &str) -> Result<Vec<u8>, Error> {
    let username = username.to_lowercase();
    let len = length_prefix(username.len())?;
    let mut bytes =
        Vec::with_capacity(CANONICAL_PREFIX.len() + CODE_LEN + 4 + username.len());
    bytes.extend_from_slice(CANONICAL_PREFIX);
    bytes.extend_from_slice(code);
    bytes.extend_from_slice(&len);
    bytes.extend_from_slice(username.as_bytes());
    Ok(bytes)
}
