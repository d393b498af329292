use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sheaf_dag::Commit;
use sheaf_format::{ChunkingConfig, Ref};
use sheaf_index::{DirectoryEntry, TreeAccessor};
use sheaf_store::ChunkAccessor;
use tracing::debug;

use crate::error::MergeResult;
use crate::traits::{MergedTree, ThreeWayMerge};

/// Which side wins a path both sides changed differently.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preference {
    Ours,
    #[default]
    Theirs,
}

/// Per-file three-way merge of directory trees.
///
/// A file changed on one side only takes that side's version; a deletion
/// counts as a change. Files changed differently on both sides are conflicts
/// and resolve to the preferred side. File contents are never merged.
#[derive(Clone, Copy, Debug, Default)]
pub struct EntryThreeWayMerge {
    pub prefer: Preference,
}

impl EntryThreeWayMerge {
    pub fn new(prefer: Preference) -> Self {
        Self { prefer }
    }
}

fn files(accessor: &Arc<dyn ChunkAccessor>, chunking: ChunkingConfig, tree: &Ref) -> MergeResult<TreeAccessor> {
    Ok(TreeAccessor::open(Arc::clone(accessor), chunking, tree)?)
}

impl ThreeWayMerge for EntryThreeWayMerge {
    fn merge(
        &self,
        accessor: Arc<dyn ChunkAccessor>,
        chunking: ChunkingConfig,
        base: &Commit,
        ours: &Commit,
        theirs: &Commit,
    ) -> MergeResult<MergedTree> {
        let base_files = files(&accessor, chunking, &base.tree)?.files()?;
        let their_files = files(&accessor, chunking, &theirs.tree)?.files()?;
        let mut result = files(&accessor, chunking, &ours.tree)?;
        let our_files = result.files()?;

        let paths: BTreeSet<&String> = base_files
            .keys()
            .chain(our_files.keys())
            .chain(their_files.keys())
            .collect();

        let mut conflicts = Vec::new();
        for path in paths {
            let b = base_files.get(path);
            let o = our_files.get(path);
            let t = their_files.get(path);
            let take: Option<Option<&DirectoryEntry>> = if o == t || t == b {
                None
            } else if o == b {
                Some(t)
            } else {
                conflicts.push(path.clone());
                match self.prefer {
                    Preference::Ours => None,
                    Preference::Theirs => Some(t),
                }
            };
            match take {
                Some(Some(entry)) => result.put_entry(path, entry.clone())?,
                Some(None) => {
                    result.remove(path)?;
                }
                None => {}
            }
        }

        let tree = result.build()?;
        debug!(
            tree = %tree.data_hash().short_hex(),
            conflicts = conflicts.len(),
            prefer = ?self.prefer,
            "merged trees"
        );
        Ok(MergedTree { tree, conflicts })
    }
}
