//! SHA-256 helpers used to derive IDs and CB58 checksums.

use sha2::{Digest, Sha256};

/// A 256-bit (32-byte) hash value.
pub type Hash256 = [u8; 32];

/// Computes the SHA-256 hash of `data`.
#[must_use]
pub fn compute_hash256(data: &[u8]) -> Hash256 {
    Sha256::digest(data).into()
}

/// Returns the last `length` bytes of the SHA-256 hash of `data`.
///
/// # Panics
///
/// Panics if `length` is greater than 32.
#[must_use]
pub fn checksum(data: &[u8], length: usize) -> Vec<u8> {
    assert!(length <= 32, "checksum length must be <= 32");
    let hash = compute_hash256(data);
    hash[32 - length..].to_vec()
}
