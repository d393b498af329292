//! The repository state machine.
//!
//! One [`Repository`] owns a working tree, the head of its branch, and an
//! open transaction. Every operation locks the repository's state mutex for
//! its whole duration. Commits write the new objects into the transaction,
//! commit it to the base store, append the branch log entry, and then rotate
//! to a fresh transaction.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};

use sheaf_crypto::{Cipher, CommitSigner};
use sheaf_dag::{read_commit, write_commit, CachedCommit, Commit, CommitCache};
use sheaf_format::{ContainerType, Ref};
use sheaf_index::{copy_commit_history, TreeAccessor};
use sheaf_merge::{BfsCommonAncestorFinder, CommonAncestorFinder, EntryThreeWayMerge, ThreeWayMerge};
use sheaf_refs::{BranchLog, BranchLogEntry, FileBranchLog, InMemoryBranchLog};
use sheaf_store::{
    ChunkAccessor, ChunkReader, ChunkStore, InMemoryChunkStore, Lease, LockRegistry, PackChunkStore,
    StoreRegistry,
};
use sheaf_tree::{Container, RandomDataAccess};
use sheaf_types::Hash;
use tracing::{debug, info};

use crate::accessor::TransactionAccessor;
use crate::config::RepositoryConfig;
use crate::error::{RepoError, RepoResult};
use crate::handle::FileHandle;

/// Result of [`Repository::merge`]. Only a missing common ancestor is an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The working tree differs from the head commit; nothing was done.
    UncommittedChanges,
    /// The head now is, or already was, the merged state.
    FastForward { head: Option<Ref> },
    /// A merge commit joining both heads was written.
    Merged { commit: Ref, conflicts: Vec<String> },
}

/// Path registries shared by every repository opened through them.
#[derive(Debug)]
pub struct Registries {
    pub stores: Arc<StoreRegistry>,
    pub locks: Arc<LockRegistry>,
}

impl Registries {
    pub fn new() -> Self {
        Self {
            stores: StoreRegistry::new(),
            locks: LockRegistry::new(),
        }
    }

    /// The process-wide registries used by [`Repository::open`].
    pub fn global() -> &'static Registries {
        static GLOBAL: OnceLock<Registries> = OnceLock::new();
        GLOBAL.get_or_init(Registries::new)
    }
}

impl Default for Registries {
    fn default() -> Self {
        Self::new()
    }
}

type SharedAccess = Arc<Mutex<RandomDataAccess>>;

pub(crate) struct RepoState {
    pub tree: TreeAccessor,
    head: Option<Ref>,
    head_tree: Option<Ref>,
    commits: CommitCache,
    handles: HashMap<String, Vec<Weak<Mutex<RandomDataAccess>>>>,
    finder: Arc<dyn CommonAncestorFinder>,
    merger: Arc<dyn ThreeWayMerge>,
}

impl RepoState {
    /// Store every dirty handle on `path`, or on all paths, into the tree.
    pub fn flush_handles(&mut self, path: Option<&str>, except: Option<&SharedAccess>) -> RepoResult<()> {
        let paths: Vec<String> = match path {
            Some(p) => vec![p.to_string()],
            None => self.handles.keys().cloned().collect(),
        };
        for p in paths {
            let live: Vec<SharedAccess> = match self.handles.get_mut(&p) {
                Some(list) => {
                    list.retain(|w| w.strong_count() > 0);
                    list.iter().filter_map(Weak::upgrade).collect()
                }
                None => continue,
            };
            for handle in live {
                if except.is_some_and(|e| Arc::ptr_eq(e, &handle)) {
                    continue;
                }
                let mut access = handle.lock().expect("lock poisoned");
                if access.is_dirty() {
                    let r = access.container_mut().to_ref()?;
                    self.tree.put_file(&p, r)?;
                    debug!(path = %p, "flushed open file");
                }
            }
        }
        self.handles.retain(|_, list| !list.is_empty());
        Ok(())
    }

    fn register(&mut self, path: &str, access: &SharedAccess) {
        let list = self.handles.entry(path.to_string()).or_default();
        list.retain(|w| w.strong_count() > 0);
        list.push(Arc::downgrade(access));
    }

    /// The tree differs from the head commit's tree.
    fn has_uncommitted(&mut self) -> RepoResult<bool> {
        let root = self.tree.build()?;
        Ok(match self.head_tree {
            Some(t) => t.data_hash() != root.data_hash(),
            None => !self.tree.list("")?.is_empty(),
        })
    }
}

pub(crate) struct RepoInner {
    pub config: RepositoryConfig,
    base: Arc<dyn ChunkStore>,
    log: Arc<dyn BranchLog>,
    pub accessor: Arc<TransactionAccessor>,
    state: Mutex<RepoState>,
    _store_lease: Option<Lease<PackChunkStore>>,
}

impl RepoInner {
    pub fn lock_state(&self) -> MutexGuard<'_, RepoState> {
        self.state.lock().expect("lock poisoned")
    }

    pub fn dyn_accessor(&self) -> Arc<dyn ChunkAccessor> {
        self.accessor.clone()
    }

    /// An editable container for the file at `r`, or a new empty one.
    pub fn file_container(&self, r: Option<Ref>) -> RepoResult<Container> {
        let container = match r {
            Some(r) => Container::read(self.dyn_accessor(), &r)?,
            None => Container::new(self.dyn_accessor(), ContainerType::Data, self.config.chunking)?,
        };
        Ok(container.with_cache_config(self.config.cache))
    }

    /// Commit the transaction, record `head` in the branch log, and rotate.
    fn publish(&self, head: Ref, commit: &Commit) -> RepoResult<BranchLogEntry> {
        let changed = self.accessor.transaction().commit()?;
        self.accessor.rotate(Arc::clone(&self.base));
        let id = commit.plain_hash(self.config.hash_algorithm);
        let message = format!("{} {}", head.to_hex(), commit.summary());
        Ok(self.log.append(id, &message, changed)?)
    }

    fn commit_internal(
        &self,
        state: &mut RepoState,
        message: &str,
        signer: Option<&dyn CommitSigner>,
        merge_parents: Vec<Ref>,
    ) -> RepoResult<Option<Ref>> {
        state.flush_handles(None, None)?;
        if merge_parents.is_empty() && !state.has_uncommitted()? {
            debug!("tree unchanged; no commit");
            return Ok(None);
        }
        let root = state.tree.build()?;

        let mut parents: Vec<Ref> = state.head.into_iter().collect();
        parents.extend(merge_parents);
        let mut commit = Commit::new(root, parents, message);
        if let Some(signer) = signer {
            commit.sign(signer);
        }
        let r = write_commit(self.dyn_accessor(), self.config.chunking, &commit)?;
        let entry = self.publish(r, &commit)?;
        state.head = Some(r);
        state.head_tree = Some(root);
        info!(
            branch = %self.config.branch,
            revision = entry.revision,
            commit = %entry.commit_id.short_hex(),
            parents = commit.parents.len(),
            changed = entry.changed.len(),
            "created commit"
        );
        Ok(Some(r))
    }

    /// Make `head`, already readable locally, the branch head.
    fn adopt(&self, state: &mut RepoState, head: Ref) -> RepoResult<()> {
        let commit = read_commit(self.dyn_accessor(), &head)?;
        state.tree.reset(&commit.tree)?;
        state.head = Some(head);
        state.head_tree = Some(commit.tree);
        let entry = self.publish(head, &commit)?;
        info!(
            branch = %self.config.branch,
            revision = entry.revision,
            commit = %entry.commit_id.short_hex(),
            "fast-forwarded"
        );
        Ok(())
    }
}

/// A versioned file tree on one branch.
///
/// Cloning shares the same repository instance.
#[derive(Clone)]
pub struct Repository {
    inner: Arc<RepoInner>,
}

impl Repository {
    /// A repository whose store and branch log live in memory.
    pub fn in_memory(config: RepositoryConfig) -> RepoResult<Self> {
        let log = Arc::new(InMemoryBranchLog::new(&config.branch)?);
        Self::build(Arc::new(InMemoryChunkStore::new()), log, config, None, None)
    }

    /// Open or create the repository in `dir` through the process-wide
    /// registries.
    pub fn open(dir: impl AsRef<Path>, config: RepositoryConfig) -> RepoResult<Self> {
        Self::open_with(dir, config, Registries::global())
    }

    /// Open or create the repository in `dir`: a pack store under `store/`
    /// and one log file per branch under `branches/`.
    pub fn open_with(dir: impl AsRef<Path>, config: RepositoryConfig, registries: &Registries) -> RepoResult<Self> {
        let dir = dir.as_ref();
        let lease = registries.stores.open_store(&dir.join("store"))?;
        let log = Arc::new(FileBranchLog::open(
            &dir.join("branches"),
            &config.branch,
            Arc::clone(&registries.locks),
        )?);
        let base: Arc<dyn ChunkStore> = lease.shared();
        Self::build(base, log, config, None, Some(lease))
    }

    /// A repository over caller-provided parts. Boxes are encrypted with
    /// `cipher` when one is given.
    pub fn with_parts(
        base: Arc<dyn ChunkStore>,
        log: Arc<dyn BranchLog>,
        config: RepositoryConfig,
        cipher: Option<Arc<dyn Cipher>>,
    ) -> RepoResult<Self> {
        Self::build(base, log, config, cipher, None)
    }

    fn build(
        base: Arc<dyn ChunkStore>,
        log: Arc<dyn BranchLog>,
        config: RepositoryConfig,
        cipher: Option<Arc<dyn Cipher>>,
        lease: Option<Lease<PackChunkStore>>,
    ) -> RepoResult<Self> {
        config.validate()?;
        let accessor = Arc::new(TransactionAccessor::new(
            Arc::clone(&base),
            config.hash_algorithm,
            config.compression,
            cipher,
        ));
        let dyn_accessor: Arc<dyn ChunkAccessor> = accessor.clone();

        let (head, head_tree, tree) = match log.head()? {
            None => (None, None, TreeAccessor::new(Arc::clone(&dyn_accessor), config.chunking)),
            Some(entry) => {
                let head = parse_head(&entry)?;
                let commit = read_commit(Arc::clone(&dyn_accessor), &head)?;
                let actual = commit.plain_hash(config.hash_algorithm);
                if actual != entry.commit_id {
                    return Err(RepoError::HeadMismatch {
                        recorded: entry.commit_id,
                        actual,
                    });
                }
                let tree = TreeAccessor::open(Arc::clone(&dyn_accessor), config.chunking, &commit.tree)?;
                (Some(head), Some(commit.tree), tree)
            }
        };
        info!(
            branch = %config.branch,
            head = ?head.map(|h| h.data_hash().short_hex()),
            "opened repository"
        );

        let state = RepoState {
            tree,
            head,
            head_tree,
            commits: CommitCache::new(Arc::clone(&dyn_accessor)),
            handles: HashMap::new(),
            finder: Arc::new(BfsCommonAncestorFinder),
            merger: Arc::new(EntryThreeWayMerge::new(config.merge_preference)),
        };
        Ok(Self {
            inner: Arc::new(RepoInner {
                config,
                base,
                log,
                accessor,
                state: Mutex::new(state),
                _store_lease: lease,
            }),
        })
    }

    /// Replace the merge services.
    pub fn set_merge_services(&self, finder: Arc<dyn CommonAncestorFinder>, merger: Arc<dyn ThreeWayMerge>) {
        let mut state = self.inner.lock_state();
        state.finder = finder;
        state.merger = merger;
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.inner.config
    }

    /// Ref of the head commit.
    pub fn head(&self) -> Option<Ref> {
        self.inner.lock_state().head
    }

    /// The commit behind `r`.
    pub fn commit_at(&self, r: &Ref) -> RepoResult<Commit> {
        Ok(read_commit(self.inner.dyn_accessor(), r)?)
    }

    pub fn read_file(&self, path: &str) -> RepoResult<Option<Vec<u8>>> {
        let mut state = self.inner.lock_state();
        state.flush_handles(Some(path), None)?;
        match state.tree.file(path)? {
            Some(r) => {
                let container = self.inner.file_container(Some(r))?;
                Ok(Some(RandomDataAccess::new(container).read_to_end()?))
            }
            None => Ok(None),
        }
    }

    /// Replace the whole content of the file at `path`.
    pub fn write_file(&self, path: &str, data: &[u8]) -> RepoResult<()> {
        let mut state = self.inner.lock_state();
        state.flush_handles(Some(path), None)?;
        let mut container = self.inner.file_container(None)?;
        container.append(data)?;
        let r = container.to_ref()?;
        state.tree.put_file(path, r)?;
        Ok(())
    }

    /// Remove a file or directory. Returns false if nothing was there.
    pub fn remove(&self, path: &str) -> RepoResult<bool> {
        let mut state = self.inner.lock_state();
        state.flush_handles(Some(path), None)?;
        Ok(state.tree.remove(path)?.is_some())
    }

    /// Names in the directory at `path` (`""` for the root), with a flag
    /// set for files.
    pub fn list(&self, path: &str) -> RepoResult<Vec<(String, bool)>> {
        let mut state = self.inner.lock_state();
        state.flush_handles(None, None)?;
        Ok(state
            .tree
            .list(path)?
            .into_iter()
            .map(|(name, entry)| (name, entry.is_file))
            .collect())
    }

    /// Open a random-access handle on the file at `path`. A missing file
    /// is created empty.
    pub fn open_file(&self, path: &str) -> RepoResult<FileHandle> {
        let mut state = self.inner.lock_state();
        state.flush_handles(Some(path), None)?;
        let current = state.tree.file(path)?;
        let container = self.inner.file_container(current)?;
        let access = Arc::new(Mutex::new(RandomDataAccess::new(container)));
        state.register(path, &access);
        Ok(FileHandle::new(Arc::clone(&self.inner), path.to_string(), access))
    }

    pub fn has_uncommitted_changes(&self) -> RepoResult<bool> {
        let mut state = self.inner.lock_state();
        state.flush_handles(None, None)?;
        state.has_uncommitted()
    }

    /// Commit the working tree. Returns `None` when nothing changed.
    pub fn commit(&self, message: &str) -> RepoResult<Option<Ref>> {
        let mut state = self.inner.lock_state();
        self.inner.commit_internal(&mut state, message, None, Vec::new())
    }

    /// Commit with a signature over the commit's plain bytes.
    pub fn commit_signed(&self, message: &str, signer: &dyn CommitSigner) -> RepoResult<Option<Ref>> {
        let mut state = self.inner.lock_state();
        self.inner.commit_internal(&mut state, message, Some(signer), Vec::new())
    }

    /// Merge the committed head of `other` into this repository.
    pub fn merge(&self, other: &Repository) -> RepoResult<MergeOutcome> {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return Ok(MergeOutcome::FastForward { head: self.head() });
        }
        let their_head = other.head();
        let their_tx = other.inner.accessor.transaction();
        self.merge_from(&other.inner.dyn_accessor(), &*their_tx, their_head)
    }

    /// Merge the commit `their_head`, readable from `their_store` through
    /// `their_accessor`.
    pub fn merge_from(
        &self,
        their_accessor: &Arc<dyn ChunkAccessor>,
        their_store: &dyn ChunkReader,
        their_head: Option<Ref>,
    ) -> RepoResult<MergeOutcome> {
        let inner = &self.inner;
        let mut state = inner.lock_state();
        state.flush_handles(None, None)?;

        if state.has_uncommitted()? {
            info!(branch = %inner.config.branch, "merge refused: uncommitted changes");
            return Ok(MergeOutcome::UncommittedChanges);
        }
        let Some(theirs) = their_head else {
            return Ok(MergeOutcome::FastForward { head: state.head });
        };
        let local_tx = inner.accessor.transaction();

        let Some(ours) = state.head else {
            copy_commit_history(their_accessor, their_store, &*local_tx, &theirs)?;
            inner.adopt(&mut state, theirs)?;
            return Ok(MergeOutcome::FastForward { head: Some(theirs) });
        };

        if local_tx.contains(&theirs.box_hash())? && state.commits.is_ancestor(&ours, &theirs)? {
            debug!("their head is already in our history");
            return Ok(MergeOutcome::FastForward { head: Some(ours) });
        }

        copy_commit_history(their_accessor, their_store, &*local_tx, &theirs)?;
        let finder = Arc::clone(&state.finder);
        let our_id = state.commits.id_of(&ours)?;
        let their_id = state.commits.id_of(&theirs)?;
        let base = finder
            .find(&mut state.commits, &ours, &theirs)?
            .ok_or(RepoError::NoCommonAncestor {
                ours: our_id,
                theirs: their_id,
            })?;

        if state.commits.id_of(&base)? == our_id {
            inner.adopt(&mut state, theirs)?;
            return Ok(MergeOutcome::FastForward { head: Some(theirs) });
        }

        let base_commit = state.commits.load(&base)?.commit.clone();
        let our_commit = state.commits.load(&ours)?.commit.clone();
        let their_commit = state.commits.load(&theirs)?.commit.clone();
        let merger = Arc::clone(&state.merger);
        let merged = merger.merge(
            inner.dyn_accessor(),
            inner.config.chunking,
            &base_commit,
            &our_commit,
            &their_commit,
        )?;
        state.tree.reset(&merged.tree)?;

        let message = format!("merge {} into {}", their_id.short_hex(), inner.config.branch);
        let commit = inner
            .commit_internal(&mut state, &message, None, vec![theirs])?
            .ok_or_else(|| RepoError::InvalidConfig("merge produced no commit".into()))?;
        info!(
            branch = %inner.config.branch,
            conflicts = merged.conflicts.len(),
            "merged"
        );
        Ok(MergeOutcome::Merged {
            commit,
            conflicts: merged.conflicts,
        })
    }

    /// Branch log entries, oldest first.
    pub fn log(&self) -> RepoResult<Vec<BranchLogEntry>> {
        Ok(self.inner.log.entries()?)
    }

    /// Commits reachable from the head, newest generation first.
    pub fn history(&self) -> RepoResult<Vec<CachedCommit>> {
        let Some(head) = self.head() else {
            return Ok(Vec::new());
        };
        Ok(CommitCache::with_head(self.inner.dyn_accessor(), head).history()?)
    }

    /// Plain hash of the head commit.
    pub fn head_id(&self) -> RepoResult<Option<Hash>> {
        let mut state = self.inner.lock_state();
        match state.head {
            Some(head) => Ok(Some(state.commits.id_of(&head)?)),
            None => Ok(None),
        }
    }
}

/// The head ref recorded at the start of a branch log message.
fn parse_head(entry: &BranchLogEntry) -> RepoResult<Ref> {
    let hex = entry.message.split(' ').next().unwrap_or_default();
    Ok(Ref::from_hex(hex)?)
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("branch", &self.inner.config.branch)
            .field("head", &self.head().map(|h| h.data_hash().short_hex()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::SeekFrom;

    use sheaf_crypto::{Ed25519Verifier, SigningKey};

    use super::*;

    fn repo() -> Repository {
        Repository::in_memory(RepositoryConfig::default()).unwrap()
    }

    #[test]
    fn commit_is_idempotent() {
        let repo = repo();
        assert_eq!(repo.commit("empty").unwrap(), None);

        repo.write_file("docs/readme.md", b"hello").unwrap();
        assert!(repo.has_uncommitted_changes().unwrap());
        let first = repo.commit("add readme").unwrap().unwrap();
        assert_eq!(repo.head(), Some(first));
        assert!(!repo.has_uncommitted_changes().unwrap());
        assert_eq!(repo.commit("again").unwrap(), None);

        // Rewriting identical content is not a change.
        repo.write_file("docs/readme.md", b"hello").unwrap();
        assert_eq!(repo.commit("same").unwrap(), None);
        assert_eq!(repo.log().unwrap().len(), 1);
    }

    #[test]
    fn read_list_remove() {
        let repo = repo();
        repo.write_file("a/b.txt", b"one").unwrap();
        repo.write_file("a/c/d.txt", b"two").unwrap();
        assert_eq!(repo.read_file("a/b.txt").unwrap().unwrap(), b"one");
        assert_eq!(repo.read_file("a/missing").unwrap(), None);
        assert_eq!(
            repo.list("a").unwrap(),
            vec![("b.txt".to_string(), true), ("c".to_string(), false)]
        );
        assert!(repo.remove("a/c").unwrap());
        assert!(!repo.remove("a/c").unwrap());
        assert_eq!(repo.list("a").unwrap().len(), 1);
    }

    #[test]
    fn log_and_history_follow_commits() {
        let repo = repo();
        let mut heads = Vec::new();
        for i in 0..3u8 {
            repo.write_file("counter", &[i]).unwrap();
            heads.push(repo.commit(&format!("step {i}\n\nbody")).unwrap().unwrap());
        }
        let log = repo.log().unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[2].revision, 2);
        assert_eq!(log[2].message, format!("{} step 2", heads[2].to_hex()));
        assert_eq!(Some(log[2].commit_id), repo.head_id().unwrap());
        assert!(!log[2].changed.is_empty());

        let history: Vec<Ref> = repo.history().unwrap().into_iter().map(|c| c.r).collect();
        assert_eq!(history, vec![heads[2], heads[1], heads[0]]);
    }

    #[test]
    fn reopen_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let registries = Registries::new();
        let head = {
            let repo = Repository::open_with(dir.path(), RepositoryConfig::default(), &registries).unwrap();
            repo.write_file("notes/today.txt", b"persisted").unwrap();
            repo.commit("write notes").unwrap().unwrap()
        };
        assert!(registries.stores.is_empty());

        let repo = Repository::open_with(dir.path(), RepositoryConfig::default(), &registries).unwrap();
        assert_eq!(repo.head(), Some(head));
        assert_eq!(repo.read_file("notes/today.txt").unwrap().unwrap(), b"persisted");
        assert!(!repo.has_uncommitted_changes().unwrap());
    }

    #[test]
    fn uncommitted_writes_are_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let registries = Registries::new();
        {
            let repo = Repository::open_with(dir.path(), RepositoryConfig::default(), &registries).unwrap();
            repo.write_file("kept", b"1").unwrap();
            repo.commit("keep").unwrap();
            repo.write_file("lost", b"2").unwrap();
        }
        let repo = Repository::open_with(dir.path(), RepositoryConfig::default(), &registries).unwrap();
        assert!(repo.read_file("kept").unwrap().is_some());
        assert_eq!(repo.read_file("lost").unwrap(), None);
    }

    #[test]
    fn head_mismatch_detected() {
        let base: Arc<dyn ChunkStore> = Arc::new(InMemoryChunkStore::new());
        let log: Arc<dyn BranchLog> = Arc::new(InMemoryBranchLog::new("master").unwrap());
        let repo = Repository::with_parts(Arc::clone(&base), Arc::clone(&log), RepositoryConfig::default(), None).unwrap();
        repo.write_file("f", b"x").unwrap();
        let head = repo.commit("one").unwrap().unwrap();

        log.append(Hash::from_hash([7; 32]), &format!("{} forged", head.to_hex()), Vec::new())
            .unwrap();
        let err = Repository::with_parts(base, log, RepositoryConfig::default(), None).unwrap_err();
        assert!(matches!(err, RepoError::HeadMismatch { .. }));
    }

    #[test]
    fn signed_commit_verifies() {
        let repo = repo();
        let key = SigningKey::generate();
        repo.write_file("f", b"signed").unwrap();
        let head = repo.commit_signed("signed change", &key).unwrap().unwrap();
        let commit = repo.commit_at(&head).unwrap();
        assert!(commit.signature.is_some());
        commit.verify(&Ed25519Verifier).unwrap();
    }

    #[test]
    fn merge_into_empty_adopts_their_head() {
        let ours = repo();
        let theirs = repo();
        theirs.write_file("shared.txt", b"base").unwrap();
        let head = theirs.commit("base").unwrap().unwrap();

        assert_eq!(ours.merge(&theirs).unwrap(), MergeOutcome::FastForward { head: Some(head) });
        assert_eq!(ours.head(), Some(head));
        assert_eq!(ours.read_file("shared.txt").unwrap().unwrap(), b"base");
        assert_eq!(ours.log().unwrap().len(), 1);

        let empty = repo();
        assert_eq!(ours.merge(&empty).unwrap(), MergeOutcome::FastForward { head: Some(head) });
    }

    #[test]
    fn fast_forward_and_ancestor_noop() {
        let ours = repo();
        let theirs = repo();
        theirs.write_file("f", b"1").unwrap();
        theirs.commit("one").unwrap();
        ours.merge(&theirs).unwrap();

        theirs.write_file("f", b"2").unwrap();
        let ahead = theirs.commit("two").unwrap().unwrap();
        assert_eq!(ours.merge(&theirs).unwrap(), MergeOutcome::FastForward { head: Some(ahead) });
        assert_eq!(ours.read_file("f").unwrap().unwrap(), b"2");

        // Their head is now part of our history.
        assert_eq!(theirs.merge(&ours).unwrap(), MergeOutcome::FastForward { head: Some(ahead) });
        assert_eq!(ours.merge(&ours).unwrap(), MergeOutcome::FastForward { head: Some(ahead) });
    }

    #[test]
    fn diverged_histories_merge_with_two_parents() {
        let ours = repo();
        let theirs = repo();
        ours.write_file("base.txt", b"base").unwrap();
        ours.commit("base").unwrap();
        theirs.merge(&ours).unwrap();

        ours.write_file("ours.txt", b"mine").unwrap();
        let our_head = ours.commit("ours").unwrap().unwrap();
        theirs.write_file("theirs.txt", b"yours").unwrap();
        let their_head = theirs.commit("theirs").unwrap().unwrap();

        let MergeOutcome::Merged { commit, conflicts } = ours.merge(&theirs).unwrap() else {
            panic!("expected a merge commit");
        };
        assert!(conflicts.is_empty());
        assert_eq!(ours.head(), Some(commit));
        let merged = ours.commit_at(&commit).unwrap();
        assert_eq!(merged.parents, vec![our_head, their_head]);
        assert_eq!(ours.read_file("ours.txt").unwrap().unwrap(), b"mine");
        assert_eq!(ours.read_file("theirs.txt").unwrap().unwrap(), b"yours");
        assert_eq!(ours.read_file("base.txt").unwrap().unwrap(), b"base");
        assert!(!ours.has_uncommitted_changes().unwrap());
    }

    #[test]
    fn unrelated_histories_fail() {
        let ours = repo();
        let theirs = repo();
        ours.write_file("a", b"a").unwrap();
        ours.commit("a").unwrap();
        theirs.write_file("b", b"b").unwrap();
        theirs.commit("b").unwrap();
        assert!(matches!(ours.merge(&theirs), Err(RepoError::NoCommonAncestor { .. })));
    }

    #[test]
    fn uncommitted_changes_block_merge() {
        let ours = repo();
        let theirs = repo();
        theirs.write_file("f", b"1").unwrap();
        let head = theirs.commit("one").unwrap().unwrap();
        ours.write_file("draft", b"wip").unwrap();
        assert_eq!(ours.merge(&theirs).unwrap(), MergeOutcome::UncommittedChanges);
        assert_eq!(ours.head(), None);

        ours.commit("draft").unwrap();
        assert!(matches!(ours.merge(&theirs), Err(RepoError::NoCommonAncestor { .. })));
        assert_ne!(ours.head(), Some(head));
    }

    #[test]
    fn handles_see_each_others_writes() {
        let repo = repo();
        let first = repo.open_file("f").unwrap();
        first.write(b"hello").unwrap();

        let second = repo.open_file("f").unwrap();
        assert_eq!(second.read_to_end().unwrap(), b"hello");

        first.seek(SeekFrom::End(0)).unwrap();
        first.write(b" world").unwrap();
        second.seek(SeekFrom::Start(0)).unwrap();
        assert_eq!(second.read_to_end().unwrap(), b"hello world");
        assert_eq!(repo.read_file("f").unwrap().unwrap(), b"hello world");
    }

    #[test]
    fn clean_handle_follows_write_file() {
        let repo = repo();
        repo.write_file("f", b"old contents").unwrap();
        let handle = repo.open_file("f").unwrap();
        assert_eq!(handle.read_to_end().unwrap(), b"old contents");

        repo.write_file("f", b"new").unwrap();
        handle.seek(SeekFrom::Start(0)).unwrap();
        assert_eq!(handle.read_to_end().unwrap(), b"new");

        handle.write(b"er").unwrap();
        drop(handle);
        assert_eq!(repo.read_file("f").unwrap().unwrap(), b"newer");
    }

    #[test]
    fn clean_handle_does_not_restore_replaced_file() {
        let repo = repo();
        repo.write_file("f", b"draft").unwrap();
        let handle = repo.open_file("f").unwrap();
        assert_eq!(handle.len().unwrap(), 5);

        repo.write_file("f", b"final").unwrap();
        handle.flush().unwrap();
        drop(handle);
        assert_eq!(repo.read_file("f").unwrap().unwrap(), b"final");
    }

    #[test]
    fn clean_handle_on_removed_file_starts_empty() {
        let repo = repo();
        repo.write_file("f", b"gone soon").unwrap();
        let handle = repo.open_file("f").unwrap();
        assert_eq!(handle.len().unwrap(), 9);

        assert!(repo.remove("f").unwrap());
        assert_eq!(handle.len().unwrap(), 0);
        assert_eq!(handle.position(), 0);

        handle.write(b"back").unwrap();
        drop(handle);
        assert_eq!(repo.read_file("f").unwrap().unwrap(), b"back");
    }

    #[test]
    fn commit_flushes_open_handles() {
        let repo = repo();
        let handle = repo.open_file("log.txt").unwrap();
        handle.write(b"line one\n").unwrap();
        handle.insert(b"header\n").unwrap();
        let head = repo.commit("with open handle").unwrap().unwrap();
        assert_eq!(repo.read_file("log.txt").unwrap().unwrap(), b"line one\nheader\n");

        handle.seek(SeekFrom::Start(0)).unwrap();
        handle.truncate(4).unwrap();
        drop(handle);
        assert_eq!(repo.read_file("log.txt").unwrap().unwrap(), b"line");
        assert_ne!(repo.commit("truncate").unwrap(), Some(head));
    }
}
