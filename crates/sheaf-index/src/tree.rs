//! Working-tree overlay over a directory hierarchy.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;

use sheaf_format::{ChunkingConfig, Ref};
use sheaf_store::ChunkAccessor;
use tracing::debug;

use crate::directory::{read_directory, validate_name, write_directory, DirectoryBox, DirectoryEntry};
use crate::error::{IndexError, IndexResult};

/// Mutable view of a directory tree bound to one chunk accessor.
///
/// Paths are `/`-separated names relative to the root. Directories are
/// loaded as walks enter them; every directory a mutating walk passes
/// through is marked dirty, and [`build`](Self::build) stores exactly the
/// dirty directories, deepest first. Rebinding the accessor with
/// [`set_accessor`](Self::set_accessor) keeps everything resident.
pub struct TreeAccessor {
    accessor: Arc<dyn ChunkAccessor>,
    chunking: ChunkingConfig,
    root: DirectoryBox,
    /// Ref of the root as last loaded or built.
    root_ref: Option<Ref>,
}

fn split_path(path: &str) -> IndexResult<Vec<&str>> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    let components: Vec<&str> = path.split('/').collect();
    for c in &components {
        validate_name(c).map_err(|_| IndexError::InvalidPath(path.to_string()))?;
    }
    Ok(components)
}

/// Walk `components` from `dir`, returning the directory they name.
fn descend<'a>(
    accessor: &Arc<dyn ChunkAccessor>,
    mut dir: &'a mut DirectoryBox,
    components: &[&str],
    create: bool,
    touch: bool,
) -> IndexResult<Option<&'a mut DirectoryBox>> {
    for (depth, name) in components.iter().enumerate() {
        if touch {
            dir.dirty = true;
        }
        let entry = match dir.entries.entry((*name).to_string()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(v) if create => v.insert(DirectoryEntry::new_directory()),
            Entry::Vacant(_) => return Ok(None),
        };
        if entry.is_file {
            return Err(IndexError::NotADirectory(components[..=depth].join("/")));
        }
        dir = entry.load_dir(accessor)?;
    }
    if touch {
        dir.dirty = true;
    }
    Ok(Some(dir))
}

fn detached(entry: &DirectoryEntry) -> DirectoryEntry {
    DirectoryEntry {
        is_file: entry.is_file,
        data: entry.data,
        attributes: entry.attributes.clone(),
        child: None,
    }
}

fn build_dir(
    accessor: &Arc<dyn ChunkAccessor>,
    chunking: ChunkingConfig,
    dir: &mut DirectoryBox,
) -> IndexResult<Ref> {
    for entry in dir.entries.values_mut() {
        if let Some(child) = entry.child.as_deref_mut() {
            if child.dirty {
                entry.data = build_dir(accessor, chunking, child)?;
            }
        }
    }
    let r = write_directory(Arc::clone(accessor), chunking, dir)?;
    dir.dirty = false;
    Ok(r)
}

fn collect_files(
    accessor: &Arc<dyn ChunkAccessor>,
    dir: &mut DirectoryBox,
    prefix: &str,
    out: &mut BTreeMap<String, DirectoryEntry>,
) -> IndexResult<()> {
    for (name, entry) in dir.entries.iter_mut() {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}/{name}")
        };
        if entry.is_file {
            out.insert(path, detached(entry));
        } else {
            let sub = entry.load_dir(accessor)?;
            collect_files(accessor, sub, &path, out)?;
        }
    }
    Ok(())
}

impl TreeAccessor {
    /// An empty tree.
    pub fn new(accessor: Arc<dyn ChunkAccessor>, chunking: ChunkingConfig) -> Self {
        Self {
            accessor,
            chunking,
            root: DirectoryBox::new(),
            root_ref: None,
        }
    }

    /// The tree whose root directory is `root`.
    pub fn open(accessor: Arc<dyn ChunkAccessor>, chunking: ChunkingConfig, root: &Ref) -> IndexResult<Self> {
        let dir = read_directory(Arc::clone(&accessor), root)?;
        Ok(Self {
            accessor,
            chunking,
            root: dir,
            root_ref: Some(*root),
        })
    }

    pub fn accessor(&self) -> &Arc<dyn ChunkAccessor> {
        &self.accessor
    }

    pub fn chunking(&self) -> ChunkingConfig {
        self.chunking
    }

    /// Bind a new accessor. Resident directories stay valid.
    pub fn set_accessor(&mut self, accessor: Arc<dyn ChunkAccessor>) {
        self.accessor = accessor;
    }

    /// Root ref as of the last load or build.
    pub fn root_ref(&self) -> Option<Ref> {
        self.root_ref
    }

    /// Touched since the last build, or never built.
    pub fn is_dirty(&self) -> bool {
        self.root.dirty || self.root_ref.is_none()
    }

    /// The entry at `path`. With `touch`, every directory on the way is
    /// marked dirty.
    pub fn get(&mut self, path: &str, touch: bool) -> IndexResult<Option<DirectoryEntry>> {
        let components = split_path(path)?;
        let Some((name, parents)) = components.split_last() else {
            return Err(IndexError::InvalidPath(path.to_string()));
        };
        let Some(dir) = descend(&self.accessor, &mut self.root, parents, false, touch)? else {
            return Ok(None);
        };
        Ok(dir.entries.get(*name).map(detached))
    }

    /// Data ref of the file at `path`.
    pub fn file(&mut self, path: &str) -> IndexResult<Option<Ref>> {
        match self.get(path, false)? {
            Some(entry) if entry.is_file => Ok(Some(entry.data)),
            Some(_) => Err(IndexError::IsADirectory(path.to_string())),
            None => Ok(None),
        }
    }

    /// Create or replace the file at `path`, creating directories on the way.
    pub fn put_file(&mut self, path: &str, data: Ref) -> IndexResult<()> {
        let mut entry = DirectoryEntry::file(data);
        if let Some(existing) = self.get(path, false)? {
            if !existing.is_file {
                return Err(IndexError::IsADirectory(path.to_string()));
            }
            entry.attributes = existing.attributes;
        }
        self.put_entry(path, entry)
    }

    /// Set the entry at `path` as given, creating directories on the way.
    pub fn put_entry(&mut self, path: &str, entry: DirectoryEntry) -> IndexResult<()> {
        let components = split_path(path)?;
        let Some((name, parents)) = components.split_last() else {
            return Err(IndexError::InvalidPath(path.to_string()));
        };
        if let Some(dir) = descend(&self.accessor, &mut self.root, parents, true, true)? {
            dir.insert(name, entry)?;
        }
        debug!(path, "put tree entry");
        Ok(())
    }

    /// Remove the entry at `path`, file or directory.
    pub fn remove(&mut self, path: &str) -> IndexResult<Option<DirectoryEntry>> {
        if self.get(path, false)?.is_none() {
            return Ok(None);
        }
        let components = split_path(path)?;
        let Some((name, parents)) = components.split_last() else {
            return Err(IndexError::InvalidPath(path.to_string()));
        };
        let removed = match descend(&self.accessor, &mut self.root, parents, false, true)? {
            Some(dir) => dir.remove(name).map(|e| detached(&e)),
            None => None,
        };
        debug!(path, "removed tree entry");
        Ok(removed)
    }

    /// Entries of the directory at `path`; `""` is the root.
    pub fn list(&mut self, path: &str) -> IndexResult<Vec<(String, DirectoryEntry)>> {
        let components = split_path(path)?;
        match descend(&self.accessor, &mut self.root, &components, false, false)? {
            Some(dir) => Ok(dir
                .entries
                .iter()
                .map(|(name, entry)| (name.clone(), detached(entry)))
                .collect()),
            None => Err(IndexError::PathNotFound(path.to_string())),
        }
    }

    /// Every file in the tree by full path.
    pub fn files(&mut self) -> IndexResult<BTreeMap<String, DirectoryEntry>> {
        let mut out = BTreeMap::new();
        collect_files(&self.accessor, &mut self.root, "", &mut out)?;
        Ok(out)
    }

    /// Store every dirty directory and return the root ref.
    pub fn build(&mut self) -> IndexResult<Ref> {
        if let (false, Some(r)) = (self.root.dirty, self.root_ref) {
            return Ok(r);
        }
        let r = build_dir(&self.accessor, self.chunking, &mut self.root)?;
        self.root_ref = Some(r);
        debug!(root = %r.data_hash().short_hex(), "built tree");
        Ok(r)
    }

    /// Drop all resident state and reload from `root`.
    pub fn reset(&mut self, root: &Ref) -> IndexResult<()> {
        self.root = read_directory(Arc::clone(&self.accessor), root)?;
        self.root_ref = Some(*root);
        Ok(())
    }
}

impl std::fmt::Debug for TreeAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeAccessor")
            .field("root_ref", &self.root_ref.map(|r| r.data_hash().short_hex()))
            .field("dirty", &self.is_dirty())
            .finish()
    }
}
