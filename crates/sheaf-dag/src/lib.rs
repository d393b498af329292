//! Commits and the commit DAG for Sheaf.
//!
//! A [`Commit`] links a directory tree [`Ref`](sheaf_format::Ref) to its
//! parent commits. Commits are stored as containers of type `Commit`; their
//! identity is the plain hash, which covers the tree, parents, and message
//! but not the signature or the physical encoding of anything referenced.
//!
//! [`CommitCache`] loads commits lazily, walking backward from a branch head,
//! and answers ancestry questions without reading the whole history when it
//! can stop early.

pub mod cache;
pub mod commit;
pub mod error;

pub use cache::{CachedCommit, CommitCache};
pub use commit::{read_commit, write_commit, Commit, CommitSignature};
pub use error::{DagError, DagResult};
