//! Branch logs for Sheaf.
//!
//! A branch is an append-only log of commit pointers. The last entry is the
//! branch head; earlier entries are the audit trail. Each entry records the
//! commit's identity, a one-line message, and every object hash the commit
//! newly wrote.
//!
//! - [`BranchLogEntry`] -- one revision, with its text encoding
//! - [`BranchLog`] -- the storage interface
//! - [`FileBranchLog`] -- one text file per branch, guarded by a per-path lock
//! - [`InMemoryBranchLog`] -- for tests and embedding
//! - [`names`] -- branch name validation

pub mod entry;
pub mod error;
pub mod file;
pub mod memory;
pub mod names;
pub mod traits;

pub use entry::BranchLogEntry;
pub use error::{RefError, RefResult};
pub use file::FileBranchLog;
pub use memory::InMemoryBranchLog;
pub use names::validate_branch_name;
pub use traits::BranchLog;
