use sheaf_format::FormatError;
use sheaf_store::StoreError;

/// Errors from chunk tree operations.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// Offset beyond the container's logical length.
    #[error("position {position} out of range for length {length}")]
    InvalidPosition { position: u64, length: u64 },

    /// A chunk-level insert or remove did not start on a chunk boundary.
    #[error("position {position} is not on a chunk boundary")]
    NotOnBoundary { position: u64 },

    /// A remove named a chunk of a different length than the one stored.
    #[error("chunk length mismatch: expected {expected}, actual {actual}")]
    LengthMismatch { expected: u64, actual: u64 },

    #[error(transparent)]
    Decode(#[from] FormatError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type TreeResult<T> = Result<T, TreeError>;
