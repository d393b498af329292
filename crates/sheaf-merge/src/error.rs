use sheaf_dag::DagError;
use sheaf_index::IndexError;

/// Errors from merge services.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error(transparent)]
    Dag(#[from] DagError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

pub type MergeResult<T> = Result<T, MergeError>;
