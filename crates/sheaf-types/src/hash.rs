use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Size in bytes of every digest handled by Sheaf.
pub const HASH_SIZE: usize = 32;

/// A fixed-size 32-byte content digest.
///
/// The same type carries two flavors of identity that are always tracked
/// separately: the *data hash* of a chunk or container (independent of how it
/// is physically encoded) and the *box hash* of its stored representation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    /// Wrap a pre-computed digest.
    pub const fn from_hash(hash: [u8; HASH_SIZE]) -> Self {
        Self(hash)
    }

    /// The all-zero hash. Used as a placeholder for "no object".
    pub const fn zero() -> Self {
        Self([0u8; HASH_SIZE])
    }

    /// Returns `true` if every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_SIZE]
    }

    /// Build a hash from a slice that must be exactly [`HASH_SIZE`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; HASH_SIZE] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: HASH_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.short_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; HASH_SIZE]> for Hash {
    fn from(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }
}

impl From<Hash> for [u8; HASH_SIZE] {
    fn from(hash: Hash) -> Self {
        hash.0
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
