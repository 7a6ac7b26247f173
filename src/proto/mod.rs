//! Protocol Buffers forms of the records a server stores for a user.

use crate::key_storage::{SEALED_NONCE_LEN, SealedIdentity};
use crate::signed_code::{CODE_LEN, StoredCode};
use crate::signing::SigningPublicKey;
use crate::Error;
use prost::Message;

#[derive(Clone, PartialEq, Message)]
pub(crate) struct SealedIdentityProto {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub nonce: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub ciphertext: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub(crate) struct StoredCodeProto {
    #[prost(bytes = "vec", tag = "1")]
    pub code: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub verification_key: Vec<u8>,
}

fn fixed<const N: usize>(bytes: &[u8], field: &str) -> Result<[u8; N], Error> {
    <[u8; N]>::try_from(bytes)
        .map_err(|_| Error::Serde(format!("Invalid {field} length: {}", bytes.len())))
}

impl SealedIdentity {
    /// Serialize the sealed identity to Protocol Buffers format
    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        let proto = SealedIdentityProto {
            version: self.version,
            nonce: self.nonce.to_vec(),
            ciphertext: self.ciphertext.clone(),
        };

        let mut buf = Vec::with_capacity(proto.encoded_len());
        proto
            .encode(&mut buf)
            .map_err(|e| Error::Serde(format!("Failed to encode sealed identity: {}", e)))?;
        Ok(buf)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let proto = SealedIdentityProto::decode(bytes)?;

        Ok(Self {
            version: proto.version,
            nonce: fixed::<SEALED_NONCE_LEN>(&proto.nonce, "nonce")?,
            ciphertext: proto.ciphertext,
        })
    }
}

impl StoredCode {
    /// Serialize the stored code to Protocol Buffers format
    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        let proto = StoredCodeProto {
            code: self.code.to_vec(),
            verification_key: self.verification_key.as_bytes().to_vec(),
        };

        let mut buf = Vec::with_capacity(proto.encoded_len());
        proto
            .encode(&mut buf)
            .map_err(|e| Error::Serde(format!("Failed to encode stored code: {}", e)))?;
        Ok(buf)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let proto = StoredCodeProto::decode(bytes)?;
        let key = fixed::<32>(&proto.verification_key, "verification key")?;

        Ok(Self {
            code: fixed::<CODE_LEN>(&proto.code, "code")?,
            verification_key: SigningPublicKey::from_bytes(&key)?,
        })
    }
}
