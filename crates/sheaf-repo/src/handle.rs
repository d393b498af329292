//! Random-access handles on repository files.

use std::io::SeekFrom;
use std::sync::{Arc, Mutex, MutexGuard};

use sheaf_format::Ref;
use sheaf_tree::RandomDataAccess;
use tracing::warn;

use crate::error::RepoResult;
use crate::repository::{RepoInner, RepoState};

/// An open file inside a [`Repository`](crate::Repository).
///
/// Edits stay in the handle until it is flushed, dropped, or the repository
/// needs the file (a read through another handle, a commit, a merge).
/// Several handles on one path see each other's flushed writes. A clean
/// handle reloads whenever the working tree holds a different version of
/// the file, whoever stored it; if the file was removed it starts over
/// empty, as [`open_file`](crate::Repository::open_file) does for a missing
/// path.
pub struct FileHandle {
    repo: Arc<RepoInner>,
    path: String,
    access: Arc<Mutex<RandomDataAccess>>,
}

impl FileHandle {
    pub(crate) fn new(repo: Arc<RepoInner>, path: String, access: Arc<Mutex<RandomDataAccess>>) -> Self {
        Self { repo, path, access }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Run `f` on this handle's cursor with the repository state locked and
    /// other writers on the path flushed.
    fn with_access<T>(
        &self,
        f: impl FnOnce(&mut RepoState, &mut RandomDataAccess) -> RepoResult<T>,
    ) -> RepoResult<T> {
        let mut state = self.repo.lock_state();
        state.flush_handles(Some(self.path.as_str()), Some(&self.access))?;
        let mut access = self.lock_access();
        if !access.is_dirty() {
            let stored = state.tree.file(&self.path)?;
            if access.container().current_ref() != stored {
                self.reload(stored, &mut access)?;
            }
        }
        f(&mut *state, &mut *access)
    }

    fn lock_access(&self) -> MutexGuard<'_, RandomDataAccess> {
        self.access.lock().expect("lock poisoned")
    }

    fn reload(&self, stored: Option<Ref>, access: &mut RandomDataAccess) -> RepoResult<()> {
        let position = access.position();
        *access = RandomDataAccess::new(self.repo.file_container(stored)?);
        let clamped = position.min(access.len());
        access.seek(SeekFrom::Start(clamped))?;
        Ok(())
    }

    pub fn read(&self, buf: &mut [u8]) -> RepoResult<usize> {
        self.with_access(|_, access| Ok(access.read(buf)?))
    }

    /// Everything from the cursor to the end.
    pub fn read_to_end(&self) -> RepoResult<Vec<u8>> {
        self.with_access(|_, access| Ok(access.read_to_end()?))
    }

    /// Overwrite at the cursor, extending the file if needed.
    pub fn write(&self, data: &[u8]) -> RepoResult<()> {
        self.with_access(|_, access| Ok(access.write(data)?))
    }

    /// Insert at the cursor, shifting the rest of the file.
    pub fn insert(&self, data: &[u8]) -> RepoResult<()> {
        self.with_access(|_, access| Ok(access.insert(data)?))
    }

    /// Remove `count` bytes at the cursor.
    pub fn delete(&self, count: u64) -> RepoResult<()> {
        self.with_access(|_, access| Ok(access.delete(count)?))
    }

    pub fn truncate(&self, length: u64) -> RepoResult<()> {
        self.with_access(|_, access| Ok(access.truncate(length)?))
    }

    pub fn seek(&self, to: SeekFrom) -> RepoResult<u64> {
        self.with_access(|_, access| Ok(access.seek(to)?))
    }

    pub fn len(&self) -> RepoResult<u64> {
        self.with_access(|_, access| Ok(access.len()))
    }

    pub fn is_empty(&self) -> RepoResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn position(&self) -> u64 {
        self.lock_access().position()
    }

    /// Store pending edits and record the file in the working tree.
    pub fn flush(&self) -> RepoResult<Ref> {
        self.with_access(|state, access| {
            let r = access.container_mut().to_ref()?;
            state.tree.put_file(&self.path, r)?;
            Ok(r)
        })
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        if !self.lock_access().is_dirty() {
            return;
        }
        if let Err(e) = self.flush() {
            warn!(path = %self.path, error = %e, "failed to flush file on drop");
        }
    }
}

impl std::fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHandle")
            .field("path", &self.path)
            .field("position", &self.position())
            .finish()
    }
}
