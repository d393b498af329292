use sheaf_dag::DagError;
use sheaf_format::FormatError;
use sheaf_index::IndexError;
use sheaf_merge::MergeError;
use sheaf_refs::RefError;
use sheaf_store::StoreError;
use sheaf_tree::TreeError;
use sheaf_types::Hash;

/// Errors from repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// The two histories share no commit, so there is nothing to merge against.
    #[error("no common ancestor between {ours} and {theirs}")]
    NoCommonAncestor { ours: Hash, theirs: Hash },

    /// The branch log head names a commit whose identity does not match.
    #[error("branch head mismatch: log records {recorded}, commit hashes to {actual}")]
    HeadMismatch { recorded: Hash, actual: Hash },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error(transparent)]
    Ref(#[from] RefError),

    #[error(transparent)]
    Dag(#[from] DagError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RepoResult<T> = Result<T, RepoError>;
