//! Choice identifiers for Snow consensus.
//!
//! Every consensus instance decides between opaque, hashable choices. In a
//! chain these are block IDs: 32-byte hashes rendered as CB58 strings. The
//! tree-structured snowball instance also needs to reason about individual
//! bits of an ID, so [`Id`] carries the bit-range helpers it relies on.

mod cb58;
mod hashing;
mod id;

pub use cb58::{decode_cb58, encode_cb58, Cb58Error};
pub use hashing::{checksum, compute_hash256, Hash256};
pub use id::{Id, IdError};

/// Length of an ID in bytes.
pub const ID_LEN: usize = 32;

/// Number of bits in an ID.
pub const NUM_BITS: usize = ID_LEN * BITS_PER_BYTE;

/// Number of bits in a byte.
pub const BITS_PER_BYTE: usize = 8;
