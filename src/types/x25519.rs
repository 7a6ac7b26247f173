use crate::provider::Provider;
use crate::types::encoding;
use crate::Error;
use x25519_dalek::{PublicKey, SharedSecret, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Public half of an X25519 key-exchange key pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct X25519PublicKey(PublicKey);

impl X25519PublicKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Standard base64 form for text transports.
    pub fn to_base64(&self) -> String {
        encoding::encode(self.as_bytes())
    }

    pub fn from_base64(encoded: &str) -> Result<Self, Error> {
        encoding::decode_array::<32>(encoded).map(Self::from)
    }
}

impl From<[u8; 32]> for X25519PublicKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(PublicKey::from(bytes))
    }
}

impl From<PublicKey> for X25519PublicKey {
    fn from(value: PublicKey) -> Self {
        Self(value)
    }
}

impl AsRef<PublicKey> for X25519PublicKey {
    fn as_ref(&self) -> &PublicKey {
        &self.0
    }
}

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct X25519Secret(Box<StaticSecret>);

impl X25519Secret {
    pub(crate) fn dh(&self, public_key: &X25519PublicKey) -> SharedSecret {
        self.0.diffie_hellman(public_key.as_ref())
    }

    pub(crate) fn public_key(&self) -> X25519PublicKey {
        let pub_key = PublicKey::from(self.0.as_ref());
        pub_key.into()
    }

    pub(crate) fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl From<[u8; 32]> for X25519Secret {
    fn from(mut bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        bytes.zeroize();
        Self(Box::new(secret))
    }
}

/// A long-term or ephemeral X25519 key pair used for key-ring derivation.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyExchangeKeyPair {
    secret: X25519Secret,
}

impl KeyExchangeKeyPair {
    /// Generates a new key pair from the provider's randomness.
    pub fn generate(provider: &dyn Provider) -> Result<Self, Error> {
        let seed = provider.random_seed()?;
        Ok(Self {
            secret: X25519Secret::from(seed),
        })
    }

    /// Rebuilds a key pair from its 32 secret bytes.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        Self {
            secret: X25519Secret::from(bytes),
        }
    }

    pub fn public_key(&self) -> X25519PublicKey {
        self.secret.public_key()
    }

    pub(crate) fn secret_bytes(&self) -> &[u8; 32] {
        self.secret.as_bytes()
    }

    /// Performs Diffie-Hellman with the peer's public key.
    ///
    /// Low-order peer keys produce an all-zero output and are rejected.
    pub(crate) fn agree(&self, peer: &X25519PublicKey) -> Result<SharedSecret, Error> {
        let shared = self.secret.dh(peer);
        if !shared.was_contributory() {
            return Err(Error::Crypto);
        }
        Ok(shared)
    }
}
