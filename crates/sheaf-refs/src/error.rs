use sheaf_store::StoreError;

/// Errors from branch log operations.
#[derive(Debug, thiserror::Error)]
pub enum RefError {
    #[error("invalid branch name: {name}: {reason}")]
    InvalidBranchName { name: String, reason: String },

    /// A log file line that does not follow the entry layout.
    #[error("malformed branch log at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    /// Registry failure while taking the per-path lock.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RefResult<T> = Result<T, RefError>;
