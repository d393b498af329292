//! The Sheaf chunk tree.
//!
//! A [`Container`] stores a byte stream as a multi-level Merkle tree of
//! content-defined chunks. Leaves are cut by the data splitter; each higher
//! level groups child hashes with the node splitter, so fan-out is
//! statistical rather than a fill factor, and two containers holding the same
//! bytes under the same chunking config have the same data hash however they
//! were written.
//!
//! - [`Container`] -- read, get, insert/append/remove chunks, splice bytes, flush to a [`Ref`](sheaf_format::Ref)
//! - [`RandomDataAccess`] -- seek/read/write/truncate cursor over a container
//! - [`ChunkIter`] -- data chunks in order from a position
//! - [`CacheManager`] -- bounded LRU deciding which resident chunks to drop
//!
//! Nodes live in an arena owned by the container; parent links are ids, and
//! only nodes with unsaved changes are pinned in memory.

mod arena;
pub mod cache;
pub mod container;
pub mod error;
pub mod iter;
pub mod random_access;
mod splice;

pub use cache::{CacheConfig, CacheManager};
pub use container::Container;
pub use error::{TreeError, TreeResult};
pub use iter::ChunkIter;
pub use random_access::RandomDataAccess;
