//! Byte storage for Sheaf.
//!
//! The chunk tree never touches files. It reads and writes boxes through a
//! [`ChunkAccessor`], which encodes chunks (compression, optional cipher)
//! and keys them by box hash in a [`ChunkStore`].
//!
//! # Stores
//!
//! - [`InMemoryChunkStore`] -- `HashMap`-based store for tests and embedding
//! - [`PackChunkStore`] -- append-only pack file plus an index file
//! - [`Transaction`] -- buffered overlay over a store with commit/cancel
//!
//! # Rules
//!
//! 1. Boxes are immutable once written; putting an existing key is a no-op.
//! 2. Writes made inside a transaction are invisible to the base store until commit.
//! 3. All I/O errors are propagated, never silently ignored.
//! 4. Several handles on one physical store go through a [`StoreRegistry`]
//!    so they share one instance and one lock.

pub mod accessor;
pub mod error;
pub mod memory;
pub mod pack;
pub mod registry;
pub mod traits;
pub mod transaction;

pub use accessor::{BoxChunkAccessor, ChunkAccessor};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryChunkStore;
pub use pack::PackChunkStore;
pub use registry::{Lease, LockRegistry, PathRegistry, StoreRegistry};
pub use traits::{ChunkReader, ChunkStore};
pub use transaction::Transaction;
