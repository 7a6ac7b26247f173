//! Per-transfer key ring derived from an X25519 key agreement.
//!
//! Both parties hash the same shared secret, public keys and nonce. Only the
//! order of the two public keys differs between the send and the receive key,
//! so each side's send key is the other side's receive key.

mod proof;
pub use proof::{PROOF_LEN, ServerProof};

use crate::provider::Provider;
use crate::types::{KeyExchangeKeyPair, SymmetricKey, X25519PublicKey, encoding};
use crate::Error;
use sha2::{Digest, Sha256};
use tracing::debug;
use x25519_dalek::SharedSecret;
use zeroize::Zeroize;

/// Length of a transfer nonce.
pub const NONCE_LEN: usize = 32;

/// Random value chosen once per transfer and shared with the peer in the clear.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferNonce([u8; NONCE_LEN]);

impl TransferNonce {
    pub fn generate(provider: &dyn Provider) -> Result<Self, Error> {
        Ok(Self(provider.random_seed()?))
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        encoding::encode(&self.0)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, Error> {
        encoding::decode_array::<NONCE_LEN>(encoded).map(Self)
    }
}

impl From<[u8; NONCE_LEN]> for TransferNonce {
    fn from(bytes: [u8; NONCE_LEN]) -> Self {
        Self(bytes)
    }
}

/// Directional keys for one transfer plus the proof the relay keeps.
pub struct KeyRing {
    send_key: SymmetricKey,
    receive_key: SymmetricKey,
    server_proof: ServerProof,
}

impl KeyRing {
    /// Derives the key ring as seen by the owner of `own`.
    ///
    /// Fails with [`Error::Crypto`] when `peer` is a low-order point.
    pub fn derive(
        own: &KeyExchangeKeyPair,
        peer: &X25519PublicKey,
        nonce: &TransferNonce,
    ) -> Result<Self, Error> {
        let shared = own.agree(peer)?;
        let own_public = own.public_key();

        let send_key = derive_send_key(&shared, &own_public, peer, nonce);
        let receive_key = derive_receive_key(&shared, &own_public, peer, nonce);
        let server_proof = ServerProof::derive(&send_key, &receive_key, nonce);
        debug!("derived transfer key ring");

        Ok(Self {
            send_key,
            receive_key,
            server_proof,
        })
    }

    /// Key for traffic from this party to the peer.
    pub fn send_key(&self) -> &SymmetricKey {
        &self.send_key
    }

    /// Key for traffic from the peer to this party.
    pub fn receive_key(&self) -> &SymmetricKey {
        &self.receive_key
    }

    /// Value handed to the relay; reveals neither key.
    pub fn server_proof(&self) -> ServerProof {
        self.server_proof
    }
}

/// `SHA-256(shared ‖ peer_public ‖ own_public ‖ nonce)`
pub(crate) fn derive_send_key(
    shared: &SharedSecret,
    own_public: &X25519PublicKey,
    peer_public: &X25519PublicKey,
    nonce: &TransferNonce,
) -> SymmetricKey {
    directional_key(shared, peer_public, own_public, nonce)
}

/// `SHA-256(shared ‖ own_public ‖ peer_public ‖ nonce)`
pub(crate) fn derive_receive_key(
    shared: &SharedSecret,
    own_public: &X25519PublicKey,
    peer_public: &X25519PublicKey,
    nonce: &TransferNonce,
) -> SymmetricKey {
    directional_key(shared, own_public, peer_public, nonce)
}

fn directional_key(
    shared: &SharedSecret,
    first: &X25519PublicKey,
    second: &X25519PublicKey,
    nonce: &TransferNonce,
) -> SymmetricKey {
    let mut digest = Sha256::new()
        .chain_update(shared.as_bytes())
        .chain_update(first.as_bytes())
        .chain_update(second.as_bytes())
        .chain_update(nonce.as_bytes())
        .finalize();

    let mut key = [0u8; 32];
    key.copy_from_slice(&digest);
    digest.as_mut_slice().zeroize();
    SymmetricKey::from(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{SeededProvider, SystemProvider};

    fn parties() -> (KeyExchangeKeyPair, KeyExchangeKeyPair, TransferNonce) {
        let provider = SystemProvider;
        (
            KeyExchangeKeyPair::generate(&provider).unwrap(),
            KeyExchangeKeyPair::generate(&provider).unwrap(),
            TransferNonce::generate(&provider).unwrap(),
        )
    }

    #[test]
    fn test_key_ring_symmetry() {
        let (alice, bob, nonce) = parties();

        let sender = KeyRing::derive(&alice, &bob.public_key(), &nonce).unwrap();
        let recipient = KeyRing::derive(&bob, &alice.public_key(), &nonce).unwrap();

        assert_eq!(sender.send_key(), recipient.receive_key());
        assert_eq!(sender.receive_key(), recipient.send_key());
        assert_eq!(sender.server_proof(), recipient.server_proof());
    }

    #[test]
    fn test_directions_differ() {
        let (alice, bob, nonce) = parties();
        let ring = KeyRing::derive(&alice, &bob.public_key(), &nonce).unwrap();

        assert_ne!(ring.send_key(), ring.receive_key());
    }

    #[test]
    fn test_send_and_receive_are_mirror_images() {
        let (alice, bob, nonce) = parties();
        let shared = alice.agree(&bob.public_key()).unwrap();
        let (a, b) = (alice.public_key(), bob.public_key());

        assert_eq!(
            derive_send_key(&shared, &a, &b, &nonce),
            derive_receive_key(&shared, &b, &a, &nonce)
        );
    }

    #[test]
    fn test_nonce_changes_every_key() {
        let (alice, bob, nonce) = parties();
        let other_nonce = TransferNonce::generate(&SystemProvider).unwrap();

        let first = KeyRing::derive(&alice, &bob.public_key(), &nonce).unwrap();
        let second = KeyRing::derive(&alice, &bob.public_key(), &other_nonce).unwrap();

        assert_ne!(first.send_key(), second.send_key());
        assert_ne!(first.receive_key(), second.receive_key());
        assert_ne!(first.server_proof(), second.server_proof());
    }

    #[test]
    fn test_third_party_derives_nothing_useful() {
        let (alice, bob, nonce) = parties();
        let mallory = KeyExchangeKeyPair::generate(&SystemProvider).unwrap();

        let sender = KeyRing::derive(&alice, &bob.public_key(), &nonce).unwrap();
        let forged = KeyRing::derive(&mallory, &alice.public_key(), &nonce).unwrap();

        assert_ne!(sender.send_key(), forged.receive_key());
        assert_ne!(sender.server_proof(), forged.server_proof());
    }

    #[test]
    fn test_low_order_peer_is_rejected() {
        let (alice, _, nonce) = parties();
        let result = KeyRing::derive(&alice, &X25519PublicKey::from([0u8; 32]), &nonce);

        assert!(matches!(result, Err(Error::Crypto)));
    }

    #[test]
    fn test_seeded_derivation_is_reproducible() {
        let derive = || {
            let provider = SeededProvider::new(42);
            let alice = KeyExchangeKeyPair::generate(&provider).unwrap();
            let bob = KeyExchangeKeyPair::generate(&provider).unwrap();
            let nonce = TransferNonce::generate(&provider).unwrap();
            KeyRing::derive(&alice, &bob.public_key(), &nonce)
                .unwrap()
                .server_proof()
        };

        assert_eq!(derive(), derive());
    }

    #[test]
    fn test_nonce_base64() {
        let nonce = TransferNonce::from([3u8; NONCE_LEN]);
        assert_eq!(
            TransferNonce::from_base64(&nonce.to_base64()).unwrap(),
            nonce
        );
    }
}
