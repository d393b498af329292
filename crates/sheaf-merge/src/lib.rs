//! Merge services for Sheaf.
//!
//! The repository treats both common-ancestor search and tree merging as
//! injected services behind [`CommonAncestorFinder`] and [`ThreeWayMerge`].
//! The defaults here are a breadth-first ancestor search and a per-file
//! three-way merge that resolves conflicts by a fixed side preference.

pub mod ancestor;
pub mod error;
pub mod three_way;
pub mod traits;

pub use ancestor::BfsCommonAncestorFinder;
pub use error::{MergeError, MergeResult};
pub use three_way::{EntryThreeWayMerge, Preference};
pub use traits::{CommonAncestorFinder, MergedTree, ThreeWayMerge};
