//! Lazily expanded view of a commit DAG.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use sheaf_format::Ref;
use sheaf_store::ChunkAccessor;
use sheaf_types::Hash;
use tracing::debug;

use crate::commit::{read_commit, Commit};
use crate::error::DagResult;

/// A loaded commit with its identity.
#[derive(Clone, Debug)]
pub struct CachedCommit {
    pub id: Hash,
    pub r: Ref,
    pub commit: Commit,
}

/// Commits loaded on demand and cached by plain hash.
///
/// The cache walks backward from a head with a FIFO frontier, so
/// [`next`](Self::next) yields history breadth first, newest generation
/// first. Ancestry queries run a depth-first search that stops as soon as
/// the target is found, and remember negative answers per target.
pub struct CommitCache {
    accessor: Arc<dyn ChunkAccessor>,
    commits: HashMap<Hash, CachedCommit>,
    ids: HashMap<Ref, Hash>,
    frontier: VecDeque<Ref>,
    queued: HashSet<Ref>,
    /// `(commit, target)` pairs known not to reach `target`.
    unreachable: HashSet<(Hash, Hash)>,
}

impl CommitCache {
    pub fn new(accessor: Arc<dyn ChunkAccessor>) -> Self {
        Self {
            accessor,
            commits: HashMap::new(),
            ids: HashMap::new(),
            frontier: VecDeque::new(),
            queued: HashSet::new(),
            unreachable: HashSet::new(),
        }
    }

    /// A cache whose history walk starts at `head`.
    pub fn with_head(accessor: Arc<dyn ChunkAccessor>, head: Ref) -> Self {
        let mut cache = Self::new(accessor);
        cache.frontier.push_back(head);
        cache.queued.insert(head);
        cache
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    /// Point the cache at a different accessor, keeping what is loaded.
    pub fn set_accessor(&mut self, accessor: Arc<dyn ChunkAccessor>) {
        self.accessor = accessor;
    }

    pub fn get(&self, id: &Hash) -> Option<&CachedCommit> {
        self.commits.get(id)
    }

    /// Load the commit behind `r`, or return the cached copy.
    pub fn load(&mut self, r: &Ref) -> DagResult<&CachedCommit> {
        let id = self.id_of(r)?;
        Ok(&self.commits[&id])
    }

    /// Plain hash of the commit behind `r`.
    pub fn id_of(&mut self, r: &Ref) -> DagResult<Hash> {
        if let Some(id) = self.ids.get(r) {
            return Ok(*id);
        }
        let commit = read_commit(Arc::clone(&self.accessor), r)?;
        let id = commit.plain_hash(self.accessor.hash_algorithm());
        self.ids.insert(*r, id);
        self.commits.entry(id).or_insert(CachedCommit { id, r: *r, commit });
        Ok(id)
    }

    /// The next commit of the backward walk from the head.
    pub fn next(&mut self) -> DagResult<Option<CachedCommit>> {
        let Some(r) = self.frontier.pop_front() else {
            return Ok(None);
        };
        let entry = self.load(&r)?.clone();
        for parent in &entry.commit.parents {
            if self.queued.insert(*parent) {
                self.frontier.push_back(*parent);
            }
        }
        Ok(Some(entry))
    }

    /// Walk the remaining history.
    pub fn history(&mut self) -> DagResult<Vec<CachedCommit>> {
        let mut out = Vec::new();
        while let Some(entry) = self.next()? {
            out.push(entry);
        }
        Ok(out)
    }

    /// Whether `ancestor` is reachable from `descendant` through parent
    /// links. A commit counts as its own ancestor.
    pub fn is_ancestor(&mut self, descendant: &Ref, ancestor: &Ref) -> DagResult<bool> {
        let start = self.id_of(descendant)?;
        let target = self.id_of(ancestor)?;
        let found = self.reaches(start, target)?;
        debug!(
            descendant = %start.short_hex(),
            ancestor = %target.short_hex(),
            found,
            loaded = self.commits.len(),
            "ancestry check"
        );
        Ok(found)
    }

    fn reaches(&mut self, start: Hash, target: Hash) -> DagResult<bool> {
        // (commit, children already pushed)
        let mut stack = vec![(start, false)];
        let mut visited = HashSet::new();
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                // Every parent finished without finding the target.
                self.unreachable.insert((id, target));
                continue;
            }
            if id == target {
                return Ok(true);
            }
            if self.unreachable.contains(&(id, target)) || !visited.insert(id) {
                continue;
            }
            stack.push((id, true));
            let parents = self.commits[&id].commit.parents.clone();
            for parent in parents.iter().rev() {
                let parent_id = self.id_of(parent)?;
                stack.push((parent_id, false));
            }
        }
        Ok(false)
    }
}

impl std::fmt::Debug for CommitCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitCache")
            .field("loaded", &self.commits.len())
            .field("frontier", &self.frontier.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::write_commit;
    use sheaf_crypto::HashAlgorithm;
    use sheaf_format::{ChunkingConfig, CompressionType};
    use sheaf_store::{BoxChunkAccessor, InMemoryChunkStore};

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

    /// root - a - b - merge
    ///          \ c /
    fn diamond(acc: &Arc<dyn ChunkAccessor>) -> [Ref; 5] {
        let root = commit(acc, &[], "root");
        let a = commit(acc, &[root], "a");
        let b = commit(acc, &[a], "b");
        let c = commit(acc, &[a], "c");
        let merge = commit(acc, &[b, c], "merge");
        [root, a, b, c, merge]
    }

    #[test]
    fn history_is_breadth_first_without_duplicates() {
        let acc = accessor();
        let [_, _, _, _, merge] = diamond(&acc);
        let mut cache = CommitCache::with_head(Arc::clone(&acc), merge);
        let messages: Vec<String> = cache
            .history()
            .unwrap()
            .iter()
            .map(|c| c.commit.summary())
            .collect();
        assert_eq!(messages, vec!["merge", "b", "c", "a", "root"]);
        assert!(cache.next().unwrap().is_none());
        assert_eq!(cache.len(), 5);
    }

    #[test]
    fn ancestry() {
        let acc = accessor();
        let [root, a, b, c, merge] = diamond(&acc);
        let mut cache = CommitCache::new(acc);
        assert!(cache.is_ancestor(&merge, &root).unwrap());
        assert!(cache.is_ancestor(&merge, &c).unwrap());
        assert!(cache.is_ancestor(&b, &b).unwrap());
        assert!(!cache.is_ancestor(&b, &c).unwrap());
        assert!(!cache.is_ancestor(&root, &a).unwrap());
        // Negative answer is remembered and stays correct.
        assert!(!cache.is_ancestor(&b, &c).unwrap());
        assert!(cache.is_ancestor(&merge, &b).unwrap());
    }

    #[test]
    fn early_hit_loads_only_the_path() {
        let acc = accessor();
        let mut chain = vec![commit(&acc, &[], "0")];
        for i in 1..20 {
            let parent = chain[i - 1];
            chain.push(commit(&acc, &[parent], &i.to_string()));
        }
        let mut cache = CommitCache::new(acc);
        assert!(cache.is_ancestor(&chain[19], &chain[17]).unwrap());
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn unrelated_roots() {
        let acc = accessor();
        let x = commit(&acc, &[], "x");
        let y = commit(&acc, &[], "y");
        let mut cache = CommitCache::new(acc);
        assert!(!cache.is_ancestor(&x, &y).unwrap());
        assert_ne!(cache.id_of(&x).unwrap(), cache.id_of(&y).unwrap());
    }
}
