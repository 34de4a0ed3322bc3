//! The 32-byte choice identifier and its bit-range helpers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::cb58::{decode_cb58, encode_cb58, Cb58Error};
use crate::hashing::compute_hash256;
use crate::{BITS_PER_BYTE, ID_LEN, NUM_BITS};

/// A 32-byte identifier for a consensus choice.
///
/// Bits are numbered from the least significant bit of byte 0 upwards, so bit
/// `i` lives in byte `i / 8` at position `i % 8`. The snowball tree walks IDs
/// in exactly this order.
///
/// ```
/// use snow_ids::Id;
///
/// let id: Id = "11111111111111111111111111111111LpoYY".parse().unwrap();
/// assert_eq!(id, Id::EMPTY);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Id([u8; ID_LEN]);

/// Errors that can occur when parsing an ID.
#[derive(Debug, Error)]
pub enum IdError {
    #[error("cb58 decoding failed: {0}")]
    Cb58(#[from] Cb58Error),

    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

impl Id {
    /// The all-zero ID.
    pub const EMPTY: Self = Self([0u8; ID_LEN]);

    #[must_use]
    pub const fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Builds an ID from a slice that must be exactly 32 bytes long.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::InvalidLength`] for any other length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, IdError> {
        let arr: [u8; ID_LEN] = bytes.try_into().map_err(|_| IdError::InvalidLength {
            expected: ID_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// The SHA-256 hash of `bytes`, as an ID.
    #[must_use]
    pub fn from_hash(bytes: &[u8]) -> Self {
        Self(compute_hash256(bytes))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Returns bit `index` of this ID as 0 or 1.
    ///
    /// # Panics
    ///
    /// Panics if `index >= 256`.
    #[must_use]
    pub fn bit(&self, index: usize) -> usize {
        assert!(index < NUM_BITS, "bit index {index} out of range");
        usize::from((self.0[index / BITS_PER_BYTE] >> (index % BITS_PER_BYTE)) & 1)
    }

    /// Derives a new ID by hashing the big-endian `prefixes` followed by this ID.
    #[must_use]
    pub fn prefix(&self, prefixes: &[u64]) -> Self {
        let mut buf = Vec::with_capacity(prefixes.len() * 8 + ID_LEN);
        for p in prefixes {
            buf.extend_from_slice(&p.to_be_bytes());
        }
        buf.extend_from_slice(&self.0);
        Self::from_hash(&buf)
    }

    /// Reports whether `id1` and `id2` agree on every bit in `[start, stop)`.
    ///
    /// An empty range is always equal. A range that runs past bit 256 is
    /// never equal.
    #[must_use]
    pub fn equal_subset(start: usize, stop: usize, id1: &Self, id2: &Self) -> bool {
        if start >= stop {
            return true;
        }
        if stop > NUM_BITS {
            return false;
        }
        Self::first_difference_subset(start, stop, id1, id2).is_none()
    }

    /// Returns the lowest bit index in `[start, stop)` where `id1` and `id2`
    /// differ, or `None` if they agree on the whole range (or it is invalid).
    #[must_use]
    pub fn first_difference_subset(
        start: usize,
        stop: usize,
        id1: &Self,
        id2: &Self,
    ) -> Option<usize> {
        if start >= stop || stop > NUM_BITS {
            return None;
        }
        let last = stop - 1;
        let first_byte = start / BITS_PER_BYTE;
        let last_byte = last / BITS_PER_BYTE;

        for index in first_byte..=last_byte {
            let mut mask = u8::MAX;
            if index == first_byte {
                // Clear the bits below `start`.
                mask &= u8::MAX << (start % BITS_PER_BYTE);
            }
            if index == last_byte {
                // Clear the bits above `last`.
                mask &= u8::MAX >> (BITS_PER_BYTE - 1 - last % BITS_PER_BYTE);
            }
            let diff = (id1.0[index] ^ id2.0[index]) & mask;
            if diff != 0 {
                return Some(index * BITS_PER_BYTE + diff.trailing_zeros() as usize);
            }
        }
        None
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode_cb58(&self.0))
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({self})")
    }
}

impl FromStr for Id {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slice(&decode_cb58(s)?)
    }
}

impl AsRef<[u8]> for Id {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; ID_LEN]> for Id {
    fn from(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            let bytes = <Vec<u8>>::deserialize(deserializer)?;
            Self::from_slice(&bytes).map_err(serde::de::Error::custom)
        }
    }
}
