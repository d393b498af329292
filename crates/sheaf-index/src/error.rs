//! Error types for the index crate.

use sheaf_dag::DagError;
use sheaf_format::{ContainerType, FormatError};
use sheaf_store::StoreError;
use sheaf_tree::TreeError;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Empty path, empty component, or a component that is not a valid name.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A path component that must be a directory names a file.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("path not found: {0}")]
    PathNotFound(String),

    /// A ref loaded as a directory points at another kind of container.
    #[error("expected a directory container, found {0:?}")]
    WrongContainer(ContainerType),

    #[error(transparent)]
    Decode(#[from] FormatError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dag(#[from] DagError),
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
