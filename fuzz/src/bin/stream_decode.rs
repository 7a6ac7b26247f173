#[macro_use]
extern crate afl;
use sealpost::stream::StreamDecryptor;
use sealpost::{StreamConfig, SymmetricKey};

fn main() {
    let key = SymmetricKey::from([7u8; 32]);
    let config = StreamConfig {
        max_chunk_size: 256,
        pad_block_size: 16,
        max_frame_size: 4096,
    };

    fuzz!(|data: &[u8]| {
        if let Ok(mut decryptor) = StreamDecryptor::new(data, data.len() as u64, &key, &config) {
            while let Ok(Some(_)) = decryptor.read_chunk() {}
        }
    });
}
