use serde::{Deserialize, Serialize};
use sha2::Digest;
use sheaf_types::Hash;

/// Digest algorithm recorded in every container header.
///
/// The wire code is stable; unknown codes are a decode error in the header
/// reader, never a silent default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    #[default]
    Blake3,
    Sha256,
}

impl HashAlgorithm {
    /// Stable wire code.
    pub const fn code(self) -> u64 {
        match self {
            Self::Blake3 => 0,
            Self::Sha256 => 1,
        }
    }

    /// Parse a wire code.
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Self::Blake3),
            1 => Some(Self::Sha256),
            _ => None,
        }
    }

    /// A fresh streaming hasher for this algorithm.
    pub fn hasher(self) -> ContentHasher {
        ContentHasher::new(self)
    }

    /// One-shot digest of `data`.
    pub fn digest(self, data: &[u8]) -> Hash {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize()
    }

    /// Digest of the empty input; the data hash of an empty container.
    pub fn empty_hash(self) -> Hash {
        self.digest(&[])
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blake3 => write!(f, "blake3"),
            Self::Sha256 => write!(f, "sha256"),
        }
    }
}

enum Inner {
    Blake3(Box<blake3::Hasher>),
    Sha256(sha2::Sha256),
}

/// Streaming content hasher over one of the supported algorithms.
pub struct ContentHasher {
    algorithm: HashAlgorithm,
    inner: Inner,
}

impl ContentHasher {
    /// Create a hasher for the given algorithm.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let inner = match algorithm {
            HashAlgorithm::Blake3 => Inner::Blake3(Box::new(blake3::Hasher::new())),
            HashAlgorithm::Sha256 => Inner::Sha256(sha2::Sha256::new()),
        };
        Self { algorithm, inner }
    }

    /// The algorithm this hasher runs.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Feed bytes.
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.inner {
            Inner::Blake3(h) => {
                h.update(data);
            }
            Inner::Sha256(h) => h.update(data),
        }
    }

    /// Finish and return the digest, consuming the hasher.
    pub fn finalize(self) -> Hash {
        match self.inner {
            Inner::Blake3(h) => Hash::from_hash(*h.finalize().as_bytes()),
            Inner::Sha256(h) => Hash::from_hash(h.finalize().into()),
        }
    }

    /// Finish, return the digest, and leave the hasher ready for new input.
    pub fn finalize_reset(&mut self) -> Hash {
        match &mut self.inner {
            Inner::Blake3(h) => {
                let out = Hash::from_hash(*h.finalize().as_bytes());
                h.reset();
                out
            }
            Inner::Sha256(h) => Hash::from_hash(h.finalize_reset().into()),
        }
    }

    /// Discard any buffered input.
    pub fn reset(&mut self) {
        match &mut self.inner {
            Inner::Blake3(h) => {
                h.reset();
            }
            Inner::Sha256(h) => sha2::Digest::reset(h),
        }
    }
}

impl std::fmt::Debug for ContentHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentHasher")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}
