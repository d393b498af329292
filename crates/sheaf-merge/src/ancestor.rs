use std::collections::{HashSet, VecDeque};

use sheaf_dag::CommitCache;
use sheaf_format::Ref;
use sheaf_types::Hash;
use tracing::debug;

use crate::error::MergeResult;
use crate::traits::CommonAncestorFinder;

/// Breadth-first search over both histories in lockstep.
///
/// The first commit reached from both heads is returned, so an ancestor
/// close to both heads wins over older shared history.
#[derive(Clone, Copy, Debug, Default)]
pub struct BfsCommonAncestorFinder;

struct Side {
    queue: VecDeque<Ref>,
    seen: HashSet<Hash>,
}

impl Side {
    fn new(head: Ref) -> Self {
        Self {
            queue: VecDeque::from([head]),
            seen: HashSet::new(),
        }
    }

    /// Visit the next commit; returns it if `other` has already seen it.
    fn step(&mut self, commits: &mut CommitCache, other: &Side) -> MergeResult<Option<Ref>> {
        let Some(r) = self.queue.pop_front() else {
            return Ok(None);
        };
        let id = commits.id_of(&r)?;
        if other.seen.contains(&id) {
            return Ok(Some(r));
        }
        if self.seen.insert(id) {
            self.queue.extend(commits.load(&r)?.commit.parents.iter().copied());
        }
        Ok(None)
    }
}

impl CommonAncestorFinder for BfsCommonAncestorFinder {
    fn find(&self, commits: &mut CommitCache, ours: &Ref, theirs: &Ref) -> MergeResult<Option<Ref>> {
        let mut a = Side::new(*ours);
        let mut b = Side::new(*theirs);
        while !a.queue.is_empty() || !b.queue.is_empty() {
            if let Some(found) = a.step(commits, &b)? {
                debug!(ancestor = %found.data_hash().short_hex(), "found common ancestor");
                return Ok(Some(found));
            }
            if let Some(found) = b.step(commits, &a)? {
                debug!(ancestor = %found.data_hash().short_hex(), "found common ancestor");
                return Ok(Some(found));
            }
        }
        debug!("no common ancestor");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use sheaf_crypto::HashAlgorithm;
    use sheaf_dag::{write_commit, Commit};
    use sheaf_format::{ChunkingConfig, CompressionType};
    use sheaf_store::{BoxChunkAccessor, ChunkAccessor, InMemoryChunkStore};

    fn accessor() -> Arc<dyn ChunkAccessor> {
        Arc::new(BoxChunkAccessor::new(
            Arc::new(InMemoryChunkStore::new()),
            HashAlgorithm::Blake3,
            CompressionType::None,
        ))
    }

    fn commit(acc: &Arc<dyn ChunkAccessor>, parents: &[Ref], message: &str) -> Ref {
        let c = Commit::new(Ref::default(), parents.to_vec(), message);
        write_commit(Arc::clone(acc), ChunkingConfig::default(), &c).unwrap()
    }

    #[test]
    fn finds_fork_point() {
        let acc = accessor();
        let root = commit(&acc, &[], "root");
        let fork = commit(&acc, &[root], "fork");
        let ours = commit(&acc, &[fork], "ours");
        let mut theirs = commit(&acc, &[fork], "theirs 1");
        for i in 2..5 {
            theirs = commit(&acc, &[theirs], &format!("theirs {i}"));
        }
        let mut cache = CommitCache::new(acc);
        let found = BfsCommonAncestorFinder.find(&mut cache, &ours, &theirs).unwrap();
        assert_eq!(found, Some(fork));
    }

    #[test]
    fn ancestor_head_is_its_own_answer() {
        let acc = accessor();
        let root = commit(&acc, &[], "root");
        let child = commit(&acc, &[root], "child");
        let mut cache = CommitCache::new(acc);
        assert_eq!(BfsCommonAncestorFinder.find(&mut cache, &child, &root).unwrap(), Some(root));
    }

    #[test]
    fn unrelated_histories() {
        let acc = accessor();
        let a = commit(&acc, &[], "a");
        let b = commit(&acc, &[], "b");
        let b2 = commit(&acc, &[b], "b2");
        let mut cache = CommitCache::new(acc);
        assert_eq!(BfsCommonAncestorFinder.find(&mut cache, &a, &b2).unwrap(), None);
    }
}
