//! Directory trees for Sheaf.
//!
//! - [`DirectoryBox`] / [`DirectoryEntry`] -- one stored directory level
//! - [`TreeAccessor`] -- editable overlay over a directory hierarchy, built back into a root ref
//! - [`copy_commit_history`] -- move commits, trees and file contents between stores

pub mod copy;
pub mod directory;
pub mod error;
pub mod tree;

pub use copy::{copy_commit_history, CopyStats};
pub use directory::{read_directory, write_directory, DirectoryBox, DirectoryEntry};
pub use error::{IndexError, IndexResult};
pub use tree::TreeAccessor;
