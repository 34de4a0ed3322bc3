//! CB58: Base58 with a trailing 4-byte SHA-256 checksum.

use thiserror::Error;

use crate::hashing::checksum;

const CHECKSUM_LEN: usize = 4;

/// Errors produced while decoding a CB58 string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Cb58Error {
    /// The string is not valid Base58.
    #[error("base58 decoding error: {0}")]
    Base58Decoding(String),

    /// The decoded payload is shorter than the checksum.
    #[error("input string is smaller than the checksum size")]
    MissingChecksum,

    /// The trailing checksum does not match the payload.
    #[error("invalid checksum")]
    BadChecksum,
}

/// Encodes `bytes` as CB58.
#[must_use]
pub fn encode_cb58(bytes: &[u8]) -> String {
    let mut checked = Vec::with_capacity(bytes.len() + CHECKSUM_LEN);
    checked.extend_from_slice(bytes);
    checked.extend_from_slice(&checksum(bytes, CHECKSUM_LEN));
    bs58::encode(checked).into_string()
}

/// Decodes a CB58 string, verifying its checksum.
///
/// # Errors
///
/// Fails if the input is not Base58, is too short, or has a bad checksum.
pub fn decode_cb58(s: &str) -> Result<Vec<u8>, Cb58Error> {
    let mut decoded = bs58::decode(s)
        .into_vec()
        .map_err(|e| Cb58Error::Base58Decoding(e.to_string()))?;

    let Some(data_len) = decoded.len().checked_sub(CHECKSUM_LEN) else {
        return Err(Cb58Error::MissingChecksum);
    };
    let provided = decoded.split_off(data_len);
    if provided != checksum(&decoded, CHECKSUM_LEN) {
        return Err(Cb58Error::BadChecksum);
    }
    Ok(decoded)
}
