//! Branch logs stored as one text file per branch.
//!
//! The file for branch `name` is `{dir}/{name}.log`; nested branch names map
//! to subdirectories. Every read and append holds the in-process lock the
//! [`LockRegistry`] hands out for that file, so handles opened separately on
//! the same path serialize. A file that does not exist yet is an empty log.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sheaf_store::LockRegistry;
use sheaf_types::Hash;
use tracing::debug;

use crate::entry::{parse_log, BranchLogEntry};
use crate::error::RefResult;
use crate::names::validate_branch_name;
use crate::traits::BranchLog;

/// A [`BranchLog`] backed by an append-only text file.
#[derive(Debug)]
pub struct FileBranchLog {
    name: String,
    path: PathBuf,
    locks: Arc<LockRegistry>,
}

impl FileBranchLog {
    /// Open the log of branch `name` under `dir`, creating directories as needed.
    pub fn open(dir: &Path, name: &str, locks: Arc<LockRegistry>) -> RefResult<Self> {
        validate_branch_name(name)?;
        let path = Self::path_for(dir, name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            name: name.to_string(),
            path,
            locks,
        })
    }

    /// Where the log of branch `name` lives under `dir`.
    pub fn path_for(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{name}.log"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_unlocked(&self) -> RefResult<Vec<BranchLogEntry>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => parse_log(&text),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl BranchLog for FileBranchLog {
    fn name(&self) -> &str {
        &self.name
    }

    fn entries(&self) -> RefResult<Vec<BranchLogEntry>> {
        let lease = self.locks.lock_for(&self.path)?;
        let _guard = lease.lock().expect("lock poisoned");
        self.read_unlocked()
    }

    fn append(&self, commit_id: Hash, message: &str, changed: Vec<Hash>) -> RefResult<BranchLogEntry> {
        let lease = self.locks.lock_for(&self.path)?;
        let _guard = lease.lock().expect("lock poisoned");

        let revision = self.read_unlocked()?.last().map_or(0, |e| e.revision + 1);
        let entry = BranchLogEntry::new(revision, commit_id, message, changed);

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(entry.encode().as_bytes())?;
        file.sync_all()?;

        debug!(
            branch = %self.name,
            revision,
            commit = %commit_id.short_hex(),
            changed = entry.changed.len(),
            "appended branch log entry"
        );
        Ok(entry)
    }
}
