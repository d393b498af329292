use sheaf_crypto::CipherError;
use sheaf_format::FormatError;
use sheaf_types::Hash;

/// Errors from byte store and chunk accessor operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested box was not found.
    #[error("box not found: {0}")]
    NotFound(Hash),

    /// Stored bytes do not hash to their key (data corruption).
    #[error("box hash mismatch: expected {expected}, computed {computed}")]
    HashMismatch { expected: Hash, computed: Hash },

    /// A pack record failed its CRC32 check.
    #[error("CRC32 mismatch for box {0}")]
    CrcMismatch(Hash),

    /// A pack or index file is malformed.
    #[error("corrupt pack at offset {offset}: {reason}")]
    CorruptPack { offset: u64, reason: String },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Box compression or decompression failed.
    #[error("compression error: {0}")]
    Compression(String),

    /// The external cipher rejected a box.
    #[error(transparent)]
    Cipher(#[from] CipherError),

    /// Encrypted boxes were requested without a cipher.
    #[error("box is encrypted but no cipher is configured")]
    MissingCipher,

    /// A wire structure inside a box failed to decode.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// The transaction was already committed or cancelled.
    #[error("transaction is closed")]
    TransactionClosed,

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
