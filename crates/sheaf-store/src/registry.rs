//! Process-wide registry of per-path shared handles.
//!
//! Opening the same physical store twice in one process must yield one
//! instance, so writes through either handle serialize on the same lock.
//! A [`PathRegistry`] maps absolute paths to reference-counted entries:
//! the entry is created by the first [`acquire`](PathRegistry::acquire) and
//! removed when its last [`Lease`] drops. This gives no cross-process
//! guarantee.

use std::collections::HashMap;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::StoreResult;
use crate::pack::PackChunkStore;

struct Entry<T> {
    value: Arc<T>,
    leases: usize,
}

/// Registry of shared values keyed by absolute path.
pub struct PathRegistry<T> {
    entries: Mutex<HashMap<PathBuf, Entry<T>>>,
}

/// Registry of open pack stores.
pub type StoreRegistry = PathRegistry<PackChunkStore>;

/// Registry of named in-process locks, used to guard branch log files.
pub type LockRegistry = PathRegistry<Mutex<()>>;

impl<T> PathRegistry<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
        })
    }

    /// Share the value registered for `path`, creating it with `open` if absent.
    pub fn acquire<F>(self: &Arc<Self>, path: &Path, open: F) -> StoreResult<Lease<T>>
    where
        F: FnOnce(&Path) -> StoreResult<T>,
    {
        let key = std::path::absolute(path)?;
        let mut entries = self.entries.lock().expect("lock poisoned");
        let value = match entries.get_mut(&key) {
            Some(entry) => {
                entry.leases += 1;
                Arc::clone(&entry.value)
            }
            None => {
                let value = Arc::new(open(&key)?);
                entries.insert(
                    key.clone(),
                    Entry {
                        value: Arc::clone(&value),
                        leases: 1,
                    },
                );
                debug!(path = %key.display(), "registered path handle");
                value
            }
        };
        Ok(Lease {
            registry: Arc::clone(self),
            path: key,
            value,
        })
    }

    /// Number of live registered paths.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, path: &Path) {
        let mut entries = self.entries.lock().expect("lock poisoned");
        if let Some(entry) = entries.get_mut(path) {
            entry.leases -= 1;
            if entry.leases == 0 {
                entries.remove(path);
                debug!(path = %path.display(), "released path handle");
            }
        }
    }
}

impl<T> std::fmt::Debug for PathRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathRegistry").field("paths", &self.len()).finish()
    }
}

impl StoreRegistry {
    /// Open, or share, the pack store in `dir`.
    pub fn open_store(self: &Arc<Self>, dir: &Path) -> StoreResult<Lease<PackChunkStore>> {
        self.acquire(dir, |p| PackChunkStore::open(p))
    }
}

impl LockRegistry {
    /// The in-process lock guarding `path`.
    pub fn lock_for(self: &Arc<Self>, path: &Path) -> StoreResult<Lease<Mutex<()>>> {
        self.acquire(path, |_| Ok(Mutex::new(())))
    }
}

/// A counted handle on a registry entry.
pub struct Lease<T> {
    registry: Arc<PathRegistry<T>>,
    path: PathBuf,
    value: Arc<T>,
}

impl<T> Lease<T> {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The shared value, independent of this lease's lifetime.
    pub fn shared(&self) -> Arc<T> {
        Arc::clone(&self.value)
    }
}

impl<T> Deref for Lease<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> Drop for Lease<T> {
    fn drop(&mut self) {
        self.registry.release(&self.path);
    }
}

impl<T> std::fmt::Debug for Lease<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease").field("path", &self.path).finish()
    }
}
