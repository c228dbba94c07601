//! Device identity block
//!
//! Offset 0x10000 of the flash layout holds a 4 KiB identity block:
//! a 20-byte SHA-1 of the payload, the JSON payload itself, a single NUL
//! terminator, and 0xFF padding up to the block size. The payload carries
//! the device id and its key:
//!
//! ```json
//! {"id":"//<hostname>/d/<b64>","key":"<b64>"}
//! ```
//!
//! where the two base64-url strings (without trailing padding) encode 5
//! and 7 random bytes respectively.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use serde::Serialize;
use sha1::{Digest, Sha1};

/// Size of the identity block in flash.
pub const ID_BLOCK_SIZE: usize = 4096;

const SHA1_LENGTH: usize = 20;

#[derive(Serialize)]
struct IdPayload {
    id: String,
    key: String,
}

/// Build a fresh identity block for a device registered under `hostname`.
pub fn generate(hostname: &str) -> Vec<u8> {
    let mut random = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut random);

    build(hostname, &random)
}

fn build(hostname: &str, random: &[u8; 12]) -> Vec<u8> {
    let payload = IdPayload {
        id: format!("//{}/d/{}", hostname, URL_SAFE_NO_PAD.encode(&random[..5])),
        key: URL_SAFE_NO_PAD.encode(&random[5..]),
    };
    let payload = serde_json::to_vec(&payload).expect("identity payload serializes");

    let mut block = Vec::with_capacity(ID_BLOCK_SIZE);
    block.extend_from_slice(&Sha1::digest(&payload));
    block.extend_from_slice(&payload);
    block.push(0);
    block.resize(ID_BLOCK_SIZE, 0xFF);
    block
}

/// Whether `block` holds a well-formed identity: the leading SHA-1 must
/// match the payload between the hash and the first NUL terminator.
pub fn is_valid(block: &[u8]) -> bool {
    if block.len() <= SHA1_LENGTH {
        return false;
    }

    let terminator = match block[SHA1_LENGTH..].iter().position(|byte| *byte == 0) {
        Some(position) => SHA1_LENGTH + position,
        None => return false,
    };

    let payload = &block[SHA1_LENGTH..terminator];
    block[..SHA1_LENGTH] == Sha1::digest(payload)[..]
}
