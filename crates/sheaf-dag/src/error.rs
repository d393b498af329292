use sheaf_crypto::SignatureError;
use sheaf_format::{ContainerType, FormatError};
use sheaf_store::StoreError;
use sheaf_tree::TreeError;

/// Errors from commit encoding and DAG traversal.
#[derive(Debug, thiserror::Error)]
pub enum DagError {
    /// A ref handed in as a commit points at another kind of container.
    #[error("not a commit: container type {0:?}")]
    NotACommit(ContainerType),

    #[error("commit is not signed")]
    Unsigned,

    #[error("bad commit signature: {0}")]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Decode(#[from] FormatError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type DagResult<T> = Result<T, DagError>;
