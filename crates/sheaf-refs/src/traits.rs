//! The [`BranchLog`] storage interface.

use sheaf_types::Hash;

use crate::entry::BranchLogEntry;
use crate::error::RefResult;

/// Append-only history of one branch.
///
/// Implementations must be thread-safe and assign revisions themselves, so
/// concurrent appenders never produce a duplicate revision.
pub trait BranchLog: Send + Sync {
    /// The branch this log belongs to.
    fn name(&self) -> &str;

    /// All entries, oldest first.
    fn entries(&self) -> RefResult<Vec<BranchLogEntry>>;

    /// Append a revision after the current head and return it.
    fn append(&self, commit_id: Hash, message: &str, changed: Vec<Hash>) -> RefResult<BranchLogEntry>;

    /// The most recent entry, or `None` for a branch with no commits.
    fn head(&self) -> RefResult<Option<BranchLogEntry>> {
        Ok(self.entries()?.pop())
    }
}
