//! Versioned file-tree repositories for Sheaf.
//!
//! A [`Repository`] combines a chunk store, a branch log and a working tree:
//!
//! - files are read and written whole, or through a [`FileHandle`]
//! - [`Repository::commit`] stores the tree, writes a commit and appends the
//!   branch log
//! - [`Repository::merge`] fast-forwards or three-way merges another
//!   repository's head
//!
//! Settings come from [`RepositoryConfig`], usually loaded from TOML.

mod accessor;
pub mod config;
pub mod error;
pub mod handle;
pub mod repository;

pub use config::RepositoryConfig;
pub use error::{RepoError, RepoResult};
pub use handle::FileHandle;
pub use repository::{MergeOutcome, Registries, Repository};
