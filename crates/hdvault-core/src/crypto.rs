//! Hash helpers used by address encoding.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Length of a hash160 digest.
pub const HASH160_LEN: usize = 20;

/// `RIPEMD160(SHA256(data))`, the pubkey hash committed to by addresses.
pub fn hash160(data: &[u8]) -> [u8; HASH160_LEN] {
    let sha = Sha256::digest(data);
    Ripemd160::digest(sha).into()
}

/// `SHA256(SHA256(data))`.
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

/// First four bytes of the double-SHA256 of `data`.
pub fn checksum(data: &[u8]) -> [u8; 4] {
    let h = double_sha256(data);
    [h[0], h[1], h[2], h[3]]
}
