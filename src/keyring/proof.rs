use super::TransferNonce;
use crate::types::{SymmetricKey, encoding};
use crate::Error;
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;

/// Length of a server proof (one SHA-512 digest).
pub const PROOF_LEN: usize = 64;

/// One-way commitment to a key ring that the relay stores and later compares.
///
/// Equality is constant-time.
#[derive(Clone, Copy, Debug)]
pub struct ServerProof([u8; PROOF_LEN]);

impl ServerProof {
    /// `SHA-512(min(sk, rk) ‖ max(sk, rk) ‖ nonce)`
    ///
    /// Ordering the keys makes the proof independent of which side derives it.
    pub(crate) fn derive(
        send_key: &SymmetricKey,
        receive_key: &SymmetricKey,
        nonce: &TransferNonce,
    ) -> Self {
        let (low, high) = if send_key.as_bytes() <= receive_key.as_bytes() {
            (send_key, receive_key)
        } else {
            (receive_key, send_key)
        };

        let digest = Sha512::new()
            .chain_update(low.as_bytes())
            .chain_update(high.as_bytes())
            .chain_update(nonce.as_bytes())
            .finalize();

        let mut proof = [0u8; PROOF_LEN];
        proof.copy_from_slice(&digest);
        Self(proof)
    }

    pub fn as_bytes(&self) -> &[u8; PROOF_LEN] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        encoding::encode(&self.0)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, Error> {
        encoding::decode_array::<PROOF_LEN>(encoded).map(Self)
    }
}

impl From<[u8; PROOF_LEN]> for ServerProof {
    fn from(bytes: [u8; PROOF_LEN]) -> Self {
        Self(bytes)
    }
}

impl ConstantTimeEq for ServerProof {
    fn ct_eq(&self, other: &Self) -> subtle::Choice {
        self.0.ct_eq(&other.0)
    }
}

impl PartialEq for ServerProof {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other).into()
    }
}

impl Eq for ServerProof {}
