//! Hashing utilities for shared-secret API keys.

use sha2::{Digest, Sha256};

/// Computes SHA-256 hash of the input and returns it as a hex string.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compares a presented API key with the configured one.
///
/// Both sides are hashed first so the comparison always runs over two
/// 64-byte digests regardless of the presented key's length.
pub fn api_key_matches(presented: &str, configured: &str) -> bool {
    if configured.is_empty() {
        return false;
    }
    let a = sha256_hex(presented);
    let b = sha256_hex(configured);
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
