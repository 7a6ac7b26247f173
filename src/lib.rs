mod error;
pub use error::Error;

mod config;
pub use config::{Config, PasswordConfig, ProviderKind, StreamConfig};

mod provider;
pub use provider::{Provider, SeededProvider, SystemProvider};

mod types;
pub use types::{KeyExchangeKeyPair, SymmetricKey, X25519PublicKey};

pub mod stream;

mod keyring;
pub use keyring::*;

mod password;
pub use password::*;

mod signing;
pub use signing::*;

mod signed_code;
pub use signed_code::*;

mod key_storage;
pub use key_storage::*;

mod proto;
