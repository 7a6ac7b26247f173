#[macro_use]
extern crate afl;
use sealpost::{SealedIdentity, StoredCode};

fn main() {
    fuzz!(|data: &[u8]| {
        let _ = SealedIdentity::deserialize(data);
        let _ = StoredCode::deserialize(data);
    });
}
