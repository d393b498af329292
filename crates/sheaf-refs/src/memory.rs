//! In-memory branch log for tests and embedding.

use std::sync::RwLock;

use sheaf_types::Hash;
use tracing::debug;

use crate::entry::BranchLogEntry;
use crate::error::RefResult;
use crate::names::validate_branch_name;
use crate::traits::BranchLog;

/// A [`BranchLog`] held in a `Vec` behind a `RwLock`. Lost on drop.
#[derive(Debug)]
pub struct InMemoryBranchLog {
    name: String,
    entries: RwLock<Vec<BranchLogEntry>>,
}

impl InMemoryBranchLog {
    pub fn new(name: &str) -> RefResult<Self> {
        validate_branch_name(name)?;
        Ok(Self {
            name: name.to_string(),
            entries: RwLock::new(Vec::new()),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BranchLog for InMemoryBranchLog {
    fn name(&self) -> &str {
        &self.name
    }

    fn entries(&self) -> RefResult<Vec<BranchLogEntry>> {
        Ok(self.entries.read().expect("lock poisoned").clone())
    }

    fn append(&self, commit_id: Hash, message: &str, changed: Vec<Hash>) -> RefResult<BranchLogEntry> {
        let mut entries = self.entries.write().expect("lock poisoned");
        let revision = entries.last().map_or(0, |e| e.revision + 1);
        let entry = BranchLogEntry::new(revision, commit_id, message, changed);
        entries.push(entry.clone());
        debug!(branch = %self.name, revision, commit = %commit_id.short_hex(), "appended branch log entry");
        Ok(entry)
    }

    fn head(&self) -> RefResult<Option<BranchLogEntry>> {
        Ok(self.entries.read().expect("lock poisoned").last().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn revisions_are_sequential() {
        let log = InMemoryBranchLog::new("master").unwrap();
        assert!(log.head().unwrap().is_none());
        let a = log.append(Hash::from_hash([1; 32]), "one", Vec::new()).unwrap();
        let b = log.append(Hash::from_hash([2; 32]), "two", vec![Hash::zero()]).unwrap();
        assert_eq!((a.revision, b.revision), (0, 1));
        assert_eq!(log.head().unwrap(), Some(b));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn rejects_bad_name() {
        assert!(InMemoryBranchLog::new("bad name").is_err());
    }

    #[test]
    fn concurrent_appends_get_distinct_revisions() {
        let log = Arc::new(InMemoryBranchLog::new("master").unwrap());
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || log.append(Hash::from_hash([i; 32]), "c", Vec::new()).unwrap())
            })
            .collect();
        let mut revisions: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap().revision).collect();
        revisions.sort_unstable();
        assert_eq!(revisions, (0..8).collect::<Vec<_>>());
    }
}
