pub(crate) mod encoding;

mod symmetric;
pub use symmetric::SymmetricKey;

mod x25519;
pub use x25519::{KeyExchangeKeyPair, X25519PublicKey};
