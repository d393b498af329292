//! Service interfaces the repository merges through.

use std::sync::Arc;

use sheaf_dag::{Commit, CommitCache};
use sheaf_format::{ChunkingConfig, Ref};
use sheaf_store::ChunkAccessor;

use crate::error::MergeResult;

/// Finds the commit two histories share.
pub trait CommonAncestorFinder: Send + Sync {
    /// A common ancestor of `ours` and `theirs`, or `None` for unrelated
    /// histories. Both heads must be readable through `commits`.
    fn find(&self, commits: &mut CommitCache, ours: &Ref, theirs: &Ref) -> MergeResult<Option<Ref>>;
}

/// Outcome of a tree merge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergedTree {
    pub tree: Ref,
    /// Paths changed differently on both sides, resolved by preference.
    pub conflicts: Vec<String>,
}

/// Combines the trees of two commits against their common ancestor.
pub trait ThreeWayMerge: Send + Sync {
    fn merge(
        &self,
        accessor: Arc<dyn ChunkAccessor>,
        chunking: ChunkingConfig,
        base: &Commit,
        ours: &Commit,
        theirs: &Commit,
    ) -> MergeResult<MergedTree>;
}
